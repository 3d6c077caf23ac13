//! 结节块归档: 以 npz 格式存储成对的 (结节块, 掩码), 供训练端读取.
//!
//! 第 `i` 对分别存放在 `patch_{i}.npy` 和 `mask_{i}.npy` 中.

use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ndarray::{Array2, ArrayView2, Ix2, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpzError, WriteNpzError};

use crate::Idx2d;

/// 最大工作通道个数.
const MAX_WORKERS: usize = 64;

/// 归档读写错误.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// workers 太大.
    #[error("工作通道最多支持 {MAX_WORKERS} 个, 但请求了 {0} 个")]
    TooManyWorkers(usize),

    /// 结节块与掩码形状不一致.
    #[error("结节块形状 {patch:?} 与掩码形状 {mask:?} 不一致")]
    ShapeMismatch {
        /// 结节块形状.
        patch: Idx2d,

        /// 掩码形状.
        mask: Idx2d,
    },

    /// 读取 npz 文件错误.
    #[error(transparent)]
    ReadNpz(#[from] ReadNpzError),

    /// 写入 npz 文件错误.
    #[error(transparent)]
    WriteNpz(#[from] WriteNpzError),

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 归档读写结果.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[inline]
fn patch_name(i: usize) -> String {
    format!("patch_{i}.npy")
}

#[inline]
fn mask_name(i: usize) -> String {
    format!("mask_{i}.npy")
}

/// 结节块归档写入器.
pub struct PatchWriter {
    inner: NpzWriter<File>,
    count: usize,
}

impl PatchWriter {
    /// 在 `path` 处创建 (或覆盖) 压缩的 npz 文件.
    pub fn create<P: AsRef<Path>>(path: P) -> ArchiveResult<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: NpzWriter::new_compressed(file),
            count: 0,
        })
    }

    /// 追加一对 (结节块, 掩码), 返回其序号.
    pub fn push(&mut self, patch: ArrayView2<f64>, mask: ArrayView2<u8>) -> ArchiveResult<usize> {
        if patch.dim() != mask.dim() {
            return Err(ArchiveError::ShapeMismatch {
                patch: patch.dim(),
                mask: mask.dim(),
            });
        }
        let i = self.count;
        self.inner.add_array(patch_name(i), &patch)?;
        self.inner.add_array(mask_name(i), &mask)?;
        self.count += 1;
        Ok(i)
    }

    /// 已写入的对数.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// 是否尚未写入任何数据?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 写入 npz 目录并关闭文件.
    pub fn finish(self) -> ArchiveResult<()> {
        self.inner.finish()?;
        Ok(())
    }
}

/// 结节块归档读取器.
///
/// 同一文件会被打开多次, 每个打开通道各自加锁, 以期在多线程读取时获得更高的并行度.
pub struct PatchArchive {
    entries: Vec<Mutex<NpzReader<File>>>,
    turn: AtomicUsize,
}

impl PatchArchive {
    /// 以 `workers` 个工作通道打开路径 `p` 处的归档. `workers` 最大为 64.
    pub fn new<P: AsRef<Path>>(workers: NonZeroUsize, p: P) -> ArchiveResult<Self> {
        let workers = workers.get();
        if workers > MAX_WORKERS {
            return Err(ArchiveError::TooManyWorkers(workers));
        }
        let mut v = Vec::with_capacity(workers);
        for _ in 0..workers {
            let file = OpenOptions::new().read(true).open(p.as_ref())?;
            v.push(Mutex::new(NpzReader::new(file)?));
        }
        Ok(Self {
            entries: v,
            turn: AtomicUsize::new(0),
        })
    }

    /// 以单个工作通道打开.
    #[inline]
    pub fn open<P: AsRef<Path>>(p: P) -> ArchiveResult<Self> {
        Self::new(NonZeroUsize::MIN, p)
    }

    /// 获取第 `i` 对 (结节块, 掩码).
    pub fn pair(&self, i: usize) -> ArchiveResult<(Array2<f64>, Array2<u8>)> {
        let mut file = self.next_entry();
        let patch = file.by_name::<OwnedRepr<f64>, Ix2>(&patch_name(i))?;
        let mask = file.by_name::<OwnedRepr<u8>, Ix2>(&mask_name(i))?;
        Ok((patch, mask))
    }

    /// 归档中的对数.
    pub fn len(&self) -> usize {
        self.next_entry().len() / 2
    }

    /// 归档是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 工作通道个数.
    #[inline]
    pub fn worker_len(&self) -> usize {
        self.entries.len()
    }

    /// 按序号依次读取所有对.
    pub fn iter(&self) -> impl Iterator<Item = ArchiveResult<(Array2<f64>, Array2<u8>)>> + '_ {
        (0..self.len()).map(|i| self.pair(i))
    }

    fn next_entry(&self) -> MutexGuard<'_, NpzReader<File>> {
        let slot = self.turn.fetch_add(1, Ordering::Relaxed) % self.worker_len();
        self.entries[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
