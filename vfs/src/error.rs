use std::io;

use libc::c_int;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 路径中的某一项或目录项不存在
    #[error("no such file or directory")]
    NotFound,
    /// 需要父目录项的操作落到了根目录上
    #[error("invalid path")]
    InvalidPath,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    /// 没有空闲的 inode 或数据块
    #[error("no free inode or block left")]
    ResourceExhausted,
    /// 间接索引表已满，文件无法继续增长
    #[error("file maximum size exceeded")]
    CapacityExceeded,
    #[error("file already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("file name too long")]
    NameTooLong,
    /// 磁盘上的目录数据无法解析
    #[error("corrupted on-disk structure: {0}")]
    Corrupted(&'static str),
    #[error("disk image I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// 转换为交给内核的错误码
    pub fn errno(&self) -> c_int {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::InvalidPath => libc::EINVAL,
            Self::NotADirectory => libc::ENOTDIR,
            Self::IsADirectory => libc::EISDIR,
            Self::ResourceExhausted => libc::ENOSPC,
            Self::CapacityExceeded => libc::EFBIG,
            Self::AlreadyExists => libc::EEXIST,
            Self::DirectoryNotEmpty => libc::ENOTEMPTY,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::Corrupted(_) | Self::Io(_) => libc::EIO,
        }
    }
}
