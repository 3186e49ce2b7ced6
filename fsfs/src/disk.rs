//! # 磁盘映像层
//!
//! 整个文件系统存放在一段定长的内存字节数组中，
//! 挂载时从宿主文件整体读入，卸载时整体写回。
//! 本层不解释任何字节的含义。

use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::ops::Range;
use std::path::Path;

use crate::config::DISK_SIZE;
use crate::Result;

pub struct Disk {
    data: Box<[u8]>,
}

impl Disk {
    /// 全零的空白磁盘
    pub fn new() -> Self {
        Self {
            data: vec![0; DISK_SIZE].into_boxed_slice(),
        }
    }

    /// 读入宿主文件；文件不足`DISK_SIZE`时余下部分保持为零，超出部分忽略
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut data = Vec::with_capacity(DISK_SIZE);
        File::open(path)?
            .take(DISK_SIZE as u64)
            .read_to_end(&mut data)?;
        data.resize(DISK_SIZE, 0);

        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    /// 覆盖写回宿主文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, &self.data)?;
        Ok(())
    }

    #[inline]
    pub fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.data[range]
    }

    #[inline]
    pub fn write(&mut self, addr: usize, src: &[u8]) {
        self.data[addr..addr + src.len()].copy_from_slice(src);
    }

    #[inline]
    pub fn zero(&mut self, range: Range<usize>) {
        self.data[range].fill(0);
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for Disk {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Disk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disk").field("size", &self.data.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::process;

    use super::*;

    #[test]
    fn short_image_loads_zero_filled() {
        let path = env::temp_dir().join(format!("fsfs-disk-short-{}.img", process::id()));
        fs::write(&path, [0xAB; 16]).unwrap();

        let disk = Disk::load(&path).unwrap();
        assert_eq!(disk.as_bytes().len(), DISK_SIZE);
        assert_eq!(disk.bytes(0..16), &[0xAB; 16]);
        assert!(disk.bytes(16..4096).iter().all(|&b| b == 0));

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn save_then_load_is_identical() {
        let path = env::temp_dir().join(format!("fsfs-disk-save-{}.img", process::id()));
        let mut disk = Disk::new();
        disk.write(DISK_SIZE - 3, b"end");
        disk.write(100, b"hello");
        disk.save(&path).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), DISK_SIZE as u64);
        let loaded = Disk::load(&path).unwrap();
        assert_eq!(loaded.bytes(100..105), b"hello");
        assert_eq!(loaded.bytes(DISK_SIZE - 3..DISK_SIZE), b"end");

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_image_is_io_error() {
        let path = env::temp_dir().join("fsfs-disk-definitely-missing/none.img");
        assert!(matches!(Disk::load(path), Err(vfs::Error::Io(_))));
    }
}
