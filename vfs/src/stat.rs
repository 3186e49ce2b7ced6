use crate::DirEntryType;

/// 文件的元信息，来自磁盘上的 inode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Inode number
    pub inode: u64,
    pub kind: DirEntryType,
    /// 类型位与权限位
    pub mode: u32,
    pub uid: u16,
    pub gid: u16,
    /// File size
    pub size: u64,
    /// Occupying blocks
    pub blocks: u64,
    /// 秒级时间戳
    pub atime: u32,
    pub mtime: u32,
}

impl Stat {
    /// 权限位，去掉了类型位
    #[inline]
    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}

/// 整个文件系统的使用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    /// Optimal I/O block size
    pub block_size: u32,
    pub blocks: u64,
    pub free_blocks: u64,
    pub files: u64,
    pub free_files: u64,
    /// 文件名最大长度
    pub name_max: u32,
}
