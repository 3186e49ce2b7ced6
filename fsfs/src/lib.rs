/* fsfs 的整体架构，自上而下 */

// 索引节点层：实现文件创建、打开、读写、删除等操作
mod vfs;

// 磁盘管理器层：位图分配与按字节读写文件
mod fs;

// 文件数据游标：文件内位置到数据块的换算
pub mod cursor;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;

// 磁盘映像层：内存中的整个磁盘
mod disk;

pub mod config;
pub mod path;

pub use self::{
    cursor::{BlockRef, Cursor},
    disk::Disk,
    fs::{FileSystem, ROOT_INODE_NUM, ROOT_PERM},
    layout::{Dir, DirEntry, DiskInode, InodeKind},
    vfs::{Inode, SetAttr},
};
pub use ::vfs::{Error, Result};

/// 数据块编号，0 表示“无块”
pub type BlockNum = u16;
/// inode 编号，根目录为 0
pub type INodeNum = u16;
