//! wal/writer — дозапись коммитов и переписывание журнала при компакции.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::metrics::{record_wal_append, record_wal_compaction, record_wal_fsync};

use super::encode::{self, WalOp};
use super::{check_wal_file_header, wal_path, write_wal_file_header, WAL_HDR_SIZE};
use super::{WAL_REC_COMMIT, WAL_REC_SNAPSHOT};

/// Ops per SNAPSHOT frame during a rewrite.
const SNAPSHOT_CHUNK_OPS: usize = 4096;

pub struct Wal {
    file: File,
    path: PathBuf,
    len: u64,
    fsync_each: bool,
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("fsync_each", &self.fsync_each)
            .finish()
    }
}

impl Wal {
    /// Открыть (или создать) WAL в `root` и встать в конец файла.
    pub fn open_for_append(root: &Path, fsync_each: bool) -> Result<Self> {
        let path = wal_path(root);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("open wal {}", path.display()))?;

        if file.metadata()?.len() < WAL_HDR_SIZE as u64 {
            debug!("wal: writing fresh header to {}", path.display());
            file.set_len(0)?;
            write_wal_file_header(&mut file)?;
            file.sync_all()?;
        } else {
            check_wal_file_header(&mut file)
                .with_context(|| format!("validate wal header {}", path.display()))?;
        }
        let len = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file,
            path,
            len,
            fsync_each,
        })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when the file holds only its header.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len <= WAL_HDR_SIZE as u64
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Дописать один кадр COMMIT со всеми операциями транзакции.
    ///
    /// При любой ошибке (запись или fsync) файл откатывается к последнему
    /// целому кадру: следующий коммит не окажется за рваным хвостом.
    pub fn append_commit(&mut self, lsn: u64, ops: &[WalOp]) -> Result<()> {
        let payload = encode::encode_ops(ops);
        let res = encode::write_record(&mut self.file, WAL_REC_COMMIT, lsn, &payload)
            .with_context(|| format!("append commit lsn={} to {}", lsn, self.path.display()))
            .and_then(|n| {
                if self.fsync_each {
                    self.fsync()?;
                }
                Ok(n)
            });
        match res {
            Ok(n) => {
                self.len += n as u64;
                record_wal_append(n);
                Ok(())
            }
            Err(e) => {
                if let Err(re) = self.rollback() {
                    warn!("wal: rollback after failed append: {:#}", re);
                }
                Err(e)
            }
        }
    }

    /// Отрезать всё, что лежит за последним целым кадром, и встать в конец.
    fn rollback(&mut self) -> Result<()> {
        self.file
            .set_len(self.len)
            .with_context(|| format!("truncate wal {} to {}", self.path.display(), self.len))?;
        self.file.seek(SeekFrom::Start(self.len))?;
        Ok(())
    }

    pub fn fsync(&mut self) -> Result<()> {
        self.file
            .sync_data()
            .with_context(|| format!("fsync wal {}", self.path.display()))?;
        record_wal_fsync();
        Ok(())
    }

    /// Переписать журнал: заголовок + кадры SNAPSHOT с живыми записями.
    ///
    /// Новый файл пишется рядом (`*.tmp`), синхронизируется и атомарно
    /// переименовывается поверх старого.
    pub fn rewrite(&mut self, lsn: u64, live: &[WalOp]) -> Result<()> {
        let tmp = self.path.with_extension("log.tmp");
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("create {}", tmp.display()))?;
        write_wal_file_header(&mut f)?;

        let mut len = WAL_HDR_SIZE as u64;
        for chunk in live.chunks(SNAPSHOT_CHUNK_OPS) {
            let payload = encode::encode_ops(chunk);
            len += encode::write_record(&mut f, WAL_REC_SNAPSHOT, lsn, &payload)? as u64;
        }
        f.sync_all()
            .with_context(|| format!("fsync {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).with_context(|| {
            format!("rename {} -> {}", tmp.display(), self.path.display())
        })?;

        let before = self.len;
        f.seek(SeekFrom::End(0))?;
        self.file = f;
        self.len = len;
        record_wal_compaction();
        info!(
            "wal: compacted {} ({} -> {} bytes, {} live entries)",
            self.path.display(),
            before,
            len,
            live.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::wal_replay;
    use std::io::Write;

    fn unique_root(prefix: &str) -> PathBuf {
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("arbor-{}-{}-{}", prefix, std::process::id(), t))
    }

    fn set(key: &[u8]) -> WalOp {
        WalOp::Set {
            key: key.to_vec(),
            value: b"v".to_vec(),
            meta: 0,
            expires_at: 0,
        }
    }

    #[test]
    fn torn_append_is_rolled_back_before_next_commit() -> Result<()> {
        let root = unique_root("wal-rollback");
        std::fs::create_dir_all(&root)?;
        let mut wal = Wal::open_for_append(&root, false)?;
        wal.append_commit(1, &[set(b"a")])?;
        let good_len = wal.len();

        // half a frame header, as left behind by a failed write
        wal.file.write_all(&[WAL_REC_COMMIT, 0, 0, 0, 2, 0, 0])?;
        wal.rollback()?;
        assert_eq!(wal.file.metadata()?.len(), good_len);

        wal.append_commit(2, &[set(b"b")])?;
        drop(wal);

        let mut lsns = Vec::new();
        wal_replay(&root, |lsn, _| {
            lsns.push(lsn);
            Ok(())
        })?;
        assert_eq!(lsns, vec![1, 2], "commit after the torn frame must survive replay");
        let _ = std::fs::remove_dir_all(&root);
        Ok(())
    }
}
