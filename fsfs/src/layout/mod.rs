//! # 磁盘数据结构层
//!
//! fsfs 的磁盘布局（按字节）：
//! 超级块 | 索引节点位图 | 数据块位图 | 索引节点区域 | 数据块区域
//!
//! 各区域的起始地址见 [`crate::config`]，本模块把 inode 编号与块编号换算为字节地址。

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, IndirectTable, InodeKind};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;

mod dir;
pub use dir::Dir;

use crate::config::{BLOCKS_START, BLOCK_SIZE, INODES_START, INODE_SIZE};
use crate::{BlockNum, INodeNum};

/// inode 在磁盘上的字节地址
#[inline]
pub const fn inode_address(inode_num: INodeNum) -> usize {
    INODES_START + inode_num as usize * INODE_SIZE
}

/// 数据块在磁盘上的字节地址；编号 0 表示“无块”，其位置从不分配
#[inline]
pub const fn block_address(block_num: BlockNum) -> usize {
    BLOCKS_START + block_num as usize * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    #[test]
    fn regions_are_contiguous() {
        assert_eq!(INODES_BITMAP_START, 4);
        assert_eq!(BLOCKS_BITMAP_START, 4 + 8192);
        assert_eq!(INODES_START, 4 + 8192 + 2304);
        assert_eq!(BLOCKS_START, INODES_START + 65536 * 64);
        assert_eq!(DATA_BLOCKS, 12276);
        assert!(block_address(DATA_BLOCKS as BlockNum) + BLOCK_SIZE <= DISK_SIZE);
        assert!(block_address(DATA_BLOCKS as BlockNum + 1) + BLOCK_SIZE > DISK_SIZE);
    }

    #[test]
    fn addresses_are_monotonic() {
        assert_eq!(inode_address(0), INODES_START);
        assert_eq!(block_address(0), BLOCKS_START);
        for i in [0, 1, 2, 100, 65534] {
            assert_eq!(inode_address(i + 1) - inode_address(i), INODE_SIZE);
        }
        for b in [0, 1, 2, 100, 12275] {
            assert_eq!(block_address(b + 1) - block_address(b), BLOCK_SIZE);
        }
        assert!(inode_address(INodeNum::MAX) + INODE_SIZE <= BLOCKS_START);
    }
}
