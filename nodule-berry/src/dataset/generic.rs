//! 通用 (scan, label) 成对数据加载器.
//!
//! 提供迭代器风格的数据集获取模式.

use std::path::{Path, PathBuf};

use super::{open_volume, LoadError};
use crate::Volume;

/// 文件名构造器. 接受病例索引, 获得文件名.
pub type FilenameBuilder = fn(u32) -> String;

/// 一个病例的 CT 扫描及其结节分割.
pub type VolumePair = (Volume<i16>, Volume<u8>);

/// 从指定索引、路径、文件名构造器来创建成对数据加载器.
///
/// # 注意
///
/// `ids` 的所有取值 `id` 必须在 `dir` 下有形如 `scan_builder(id)` 和
/// `label_builder(id)` 的 nifti 文件, 否则加载器在迭代时会返回 `Err`.
pub fn pair_loader<I: IntoIterator<Item = u32>, P: AsRef<Path>>(
    ids: I,
    dir: P,
    scan_builder: FilenameBuilder,
    label_builder: FilenameBuilder,
) -> PairLoader {
    let mut ids: Vec<u32> = ids.into_iter().collect();
    ids.reverse();

    PairLoader {
        dir: dir.as_ref().to_owned(),
        ids_rev: ids,
        scan_builder,
        label_builder,
    }
}

/// (scan, label) 数据加载器, 并在内部自动转换文件名.
#[derive(Debug)]
pub struct PairLoader {
    dir: PathBuf,
    ids_rev: Vec<u32>,
    scan_builder: FilenameBuilder,
    label_builder: FilenameBuilder,
}

impl PairLoader {
    /// 病例 `id` 的扫描文件路径.
    #[inline]
    pub fn scan_path(&self, id: u32) -> PathBuf {
        self.dir.join((self.scan_builder)(id))
    }

    /// 病例 `id` 的分割文件路径.
    #[inline]
    pub fn label_path(&self, id: u32) -> PathBuf {
        self.dir.join((self.label_builder)(id))
    }
}

impl Iterator for PairLoader {
    type Item = (u32, Result<VolumePair, LoadError>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids_rev.pop()?;
        let pair = open_volume(self.scan_path(id))
            .and_then(|scan| Ok((scan, open_volume(self.label_path(id))?)));
        Some((id, pair))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.ids_rev.len(), Some(self.ids_rev.len()))
    }
}

impl ExactSizeIterator for PairLoader {}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_name(id: u32) -> String {
        format!("{id:04}_ct.nii.gz")
    }

    fn label_name(id: u32) -> String {
        format!("{id:04}_seg.nii.gz")
    }

    #[test]
    fn test_pair_loader_order_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        let loader = pair_loader([3, 1, 2], dir.path(), scan_name, label_name);
        assert_eq!(loader.len(), 3);
        assert_eq!(loader.scan_path(7), dir.path().join("0007_ct.nii.gz"));
        assert_eq!(loader.label_path(7), dir.path().join("0007_seg.nii.gz"));

        // 文件不存在, 但顺序与索引仍然正确.
        let got: Vec<(u32, bool)> = loader.map(|(id, r)| (id, r.is_err())).collect();
        assert_eq!(got, vec![(3, true), (1, true), (2, true)]);
    }
}
