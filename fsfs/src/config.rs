//! 磁盘几何参数，编译期确定
//!
//! 整个磁盘按字节寻址，地址长度为 24 位。

use core::mem;

use crate::{BlockNum, INodeNum};

/// 地址位数
pub const ADDRESS_LENGTH: usize = 24;
/// 磁盘映像总字节数
pub const DISK_SIZE: usize = 1 << ADDRESS_LENGTH;

pub const BLOCK_SIZE: usize = 1 << 10;
/// 块位图所能描述的块数
pub const BLOCK_NUM: usize = 18 * (1 << 10);

/// inode 编号是`u16`，因此 inode 表最多有 2^16 项
pub const INODES_NUM_MAX: usize = 1 << (mem::size_of::<INodeNum>() * 8);
pub const INODE_SIZE: usize = 64;

pub const DIRECT_ADDRESS_NUM: usize = 10;
pub const INDIRECT_ADDRESS_NUM: usize = 1;
/// 一个间接索引块能容纳的块编号数
pub const INDIRECT_BLOCK_ADDRESS_NUM: usize = BLOCK_SIZE / mem::size_of::<BlockNum>();

/// 文件最大字节数
pub const FILE_SIZE_MAX: usize =
    (DIRECT_ADDRESS_NUM + INDIRECT_ADDRESS_NUM * INDIRECT_BLOCK_ADDRESS_NUM) * BLOCK_SIZE;

/// 目录项的最大字节数，受限于`u8`的长度字段
pub const DIRENT_MAX_SIZE: usize = u8::MAX as usize;

/// 超级块：已用块数与已用 inode 数，各占两字节
pub const SUPER_BLOCK_SIZE: usize = mem::size_of::<u16>() * 2;

pub const INODES_BITMAP_START: usize = SUPER_BLOCK_SIZE;
pub const INODES_BITMAP_SIZE: usize = INODES_NUM_MAX / 8;

pub const BLOCKS_BITMAP_START: usize = INODES_BITMAP_START + INODES_BITMAP_SIZE;
pub const BLOCKS_BITMAP_SIZE: usize = BLOCK_NUM / 8;

pub const INODES_START: usize = BLOCKS_BITMAP_START + BLOCKS_BITMAP_SIZE;
pub const INODES_SIZE: usize = INODES_NUM_MAX * INODE_SIZE;

pub const BLOCKS_START: usize = INODES_START + INODES_SIZE;

/// 真正可分配的数据块数。
///
/// 块编号从 1 开始，编号`n`的块位于`BLOCKS_START + n * BLOCK_SIZE`，
/// 只有整块都落在映像内的编号才能分配出去。
pub const DATA_BLOCKS: usize = {
    let fit = (DISK_SIZE - BLOCKS_START) / BLOCK_SIZE - 1;
    if fit < BLOCK_NUM {
        fit
    } else {
        BLOCK_NUM
    }
};

/// 可分配的 inode 数，受限于超级块里`u16`的计数器
pub const DATA_INODES: usize = u16::MAX as usize;
