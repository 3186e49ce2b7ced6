//! 文件系统与其宿主（FUSE 适配层）之间交换的数据类型

mod dirent;
mod error;
mod stat;

pub use self::{
    dirent::{DirEntry, DirEntryType},
    error::{Error, Result},
    stat::{Stat, StatFs},
};
