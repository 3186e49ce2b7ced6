//! 索引节点
//!
//! 磁盘上的 inode 记录定长 64 字节（小端）：
//!
//! ```text
//! +----+----+----+----+----+----+----+----+
//! |       MODE        |   UID   |   GID   |
//! +----+----+----+----+----+----+----+----+
//! |       SIZE        |    ACCESS TIME    |
//! +----+----+----+----+----+----+----+----+
//! |    MODIFY TIME    |  10x DIRECT ...   |
//! +----+----+----+----+                   +
//! |                   ... DIRECT |INDIRECT|
//! +----+----+----+----+----+----+----+----+
//! /          <PADDING to 64 bytes>        /
//! +----+----+----+----+----+----+----+----+
//! ```
//!
//! 间接索引块位于数据区，整块连续存储 512 个**块编号**，
//! 它不在 inode 记录内，因此序列化时作为附带的块数据单独输出。

use std::time::{SystemTime, UNIX_EPOCH};

use enumflags2::{bitflags, BitFlags};

use super::block_address;
use crate::config::{
    BLOCK_SIZE, DIRECT_ADDRESS_NUM, INDIRECT_ADDRESS_NUM, INDIRECT_BLOCK_ADDRESS_NUM, INODE_SIZE,
};
use crate::disk::Disk;
use crate::{BlockNum, Error, INodeNum, Result};

const MODE: usize = 0;
const UID: usize = 4;
const GID: usize = 6;
const SIZE: usize = 8;
const ATIME: usize = 12;
const MTIME: usize = 16;
const DIRECT: usize = 20;
const INDIRECT: usize = DIRECT + DIRECT_ADDRESS_NUM * 2;

/// 间接索引块
pub type IndirectBlock = [BlockNum; INDIRECT_BLOCK_ADDRESS_NUM];

/// 间接索引块序列化后的内容：`(块编号, 块数据)`
pub type IndirectBlockBytes = (BlockNum, [u8; BLOCK_SIZE]);

/// inode 的类型位，与`st_mode`的`S_IFDIR`/`S_IFREG`一致
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Directory = 0o040000,
    File = 0o100000,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    /// 类型位与权限位
    pub mode: u32,
    pub uid: u16,
    pub gid: u16,
    /// 文件的逻辑字节数
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    /// 直接索引，0 表示未分配
    pub direct: [BlockNum; DIRECT_ADDRESS_NUM],
    /// 唯一的一级间接索引
    pub indirect: IndirectTable,
}

/// 一级间接索引：要么还没分配，要么连同其中的块编号表一起载入了内存
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IndirectTable {
    #[default]
    NotAllocated,
    Loaded {
        /// 间接索引块自身的编号
        block: BlockNum,
        table: Box<IndirectBlock>,
    },
}

impl DiskInode {
    /// 新建的 inode 大小为 0，没有任何数据块
    pub fn new(kind: InodeKind, perm: u32, uid: u16, gid: u16) -> Self {
        let now = now();
        Self {
            mode: kind as u32 | (perm & 0o7777),
            uid,
            gid,
            size: 0,
            atime: now,
            mtime: now,
            direct: [0; DIRECT_ADDRESS_NUM],
            indirect: IndirectTable::NotAllocated,
        }
    }

    pub fn kind(&self) -> InodeKind {
        if BitFlags::<InodeKind>::from_bits_truncate(self.mode).contains(InodeKind::Directory) {
            InodeKind::Directory
        } else {
            InodeKind::File
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == InodeKind::Directory
    }

    /// 更新修改时间
    #[inline]
    pub fn touch(&mut self) {
        self.mtime = now();
    }

    /// 读出`inode_num`号 inode；若间接索引非零，一并载入间接索引块
    pub fn read_from_disk(disk: &Disk, inode_num: INodeNum) -> Self {
        let addr = super::inode_address(inode_num);
        let bytes = disk.bytes(addr..addr + INODE_SIZE);

        let mut direct = [0; DIRECT_ADDRESS_NUM];
        for (i, block) in direct.iter_mut().enumerate() {
            *block = le_u16(&bytes[DIRECT + i * 2..]);
        }

        let indirect = match le_u16(&bytes[INDIRECT..]) {
            0 => IndirectTable::NotAllocated,
            block => {
                let addr = block_address(block);
                let data = disk.bytes(addr..addr + BLOCK_SIZE);
                let mut table = Box::new([0; INDIRECT_BLOCK_ADDRESS_NUM]);
                for (i, entry) in table.iter_mut().enumerate() {
                    *entry = le_u16(&data[i * 2..]);
                }
                IndirectTable::Loaded { block, table }
            }
        };

        Self {
            mode: le_u32(&bytes[MODE..]),
            uid: le_u16(&bytes[UID..]),
            gid: le_u16(&bytes[GID..]),
            size: le_u32(&bytes[SIZE..]),
            atime: le_u32(&bytes[ATIME..]),
            mtime: le_u32(&bytes[MTIME..]),
            direct,
            indirect,
        }
    }

    /// 序列化为定长记录，以及每个非零间接索引块的内容
    pub fn to_bytes(&self) -> ([u8; INODE_SIZE], Vec<IndirectBlockBytes>) {
        let mut bytes = [0; INODE_SIZE];
        bytes[MODE..MODE + 4].copy_from_slice(&self.mode.to_le_bytes());
        bytes[UID..UID + 2].copy_from_slice(&self.uid.to_le_bytes());
        bytes[GID..GID + 2].copy_from_slice(&self.gid.to_le_bytes());
        bytes[SIZE..SIZE + 4].copy_from_slice(&self.size.to_le_bytes());
        bytes[ATIME..ATIME + 4].copy_from_slice(&self.atime.to_le_bytes());
        bytes[MTIME..MTIME + 4].copy_from_slice(&self.mtime.to_le_bytes());
        for (i, block) in self.direct.iter().enumerate() {
            bytes[DIRECT + i * 2..DIRECT + i * 2 + 2].copy_from_slice(&block.to_le_bytes());
        }

        let mut indirect_blocks = Vec::with_capacity(INDIRECT_ADDRESS_NUM);
        if let IndirectTable::Loaded { block, table } = &self.indirect {
            bytes[INDIRECT..INDIRECT + 2].copy_from_slice(&block.to_le_bytes());

            let mut data = [0; BLOCK_SIZE];
            for (chunk, entry) in data.chunks_exact_mut(2).zip(table.iter()) {
                chunk.copy_from_slice(&entry.to_le_bytes());
            }
            indirect_blocks.push((*block, data));
        }

        (bytes, indirect_blocks)
    }

    /// 为 inode 挂上新分配的间接索引块，块内编号全部置零。
    ///
    /// inode 只有一个间接索引槽位，超出后报错。
    pub fn expand_indirect_addresses(&mut self, new_blocks: &[BlockNum]) -> Result<()> {
        let used = self.indirect_blocks();
        if used + new_blocks.len() > INDIRECT_ADDRESS_NUM {
            return Err(Error::CapacityExceeded);
        }

        if let Some(&block) = new_blocks.first() {
            self.indirect = IndirectTable::Loaded {
                block,
                table: Box::new([0; INDIRECT_BLOCK_ADDRESS_NUM]),
            };
        }

        Ok(())
    }

    /// inode 引用的全部块：非零的直接索引、间接索引块自身以及其中非零的编号
    pub fn referenced_blocks(&self) -> Vec<BlockNum> {
        let mut blocks: Vec<BlockNum> = self.direct.iter().copied().filter(|&b| b != 0).collect();

        if let IndirectTable::Loaded { block, table } = &self.indirect {
            blocks.push(*block);
            blocks.extend(table.iter().copied().filter(|&b| b != 0));
        }

        blocks
    }

    /// 缩小到`new_size`字节，返回不再需要的块；若新大小不小于当前大小则只改大小
    pub fn truncate_blocks(&mut self, new_size: u32) -> Vec<BlockNum> {
        let mut dropped = Vec::new();
        if new_size < self.size {
            let kept = (new_size as usize).div_ceil(BLOCK_SIZE);

            for block in self.direct.iter_mut().skip(kept) {
                if *block != 0 {
                    dropped.push(*block);
                    *block = 0;
                }
            }

            let kept_indirect = kept.saturating_sub(DIRECT_ADDRESS_NUM);
            if let IndirectTable::Loaded { block, table } = &mut self.indirect {
                for entry in table.iter_mut().skip(kept_indirect) {
                    if *entry != 0 {
                        dropped.push(*entry);
                        *entry = 0;
                    }
                }
                if kept_indirect == 0 {
                    dropped.push(*block);
                    self.indirect = IndirectTable::NotAllocated;
                }
            }
        }

        self.size = new_size;
        dropped
    }

    /// 已挂上的间接索引块个数
    #[inline]
    fn indirect_blocks(&self) -> usize {
        match self.indirect {
            IndirectTable::NotAllocated => 0,
            IndirectTable::Loaded { .. } => 1,
        }
    }
}

impl IndirectTable {
    /// 间接索引块自身的编号，未分配时为 0
    #[inline]
    pub fn block(&self) -> BlockNum {
        match self {
            Self::NotAllocated => 0,
            Self::Loaded { block, .. } => *block,
        }
    }

    /// 表内第`index`项，未分配时视为空洞
    #[inline]
    pub fn get(&self, index: usize) -> BlockNum {
        match self {
            Self::NotAllocated => 0,
            Self::Loaded { table, .. } => table[index],
        }
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut BlockNum> {
        match self {
            Self::NotAllocated => None,
            Self::Loaded { table, .. } => Some(&mut table[index]),
        }
    }
}

/// 秒级 UNIX 时间戳
pub(crate) fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}

#[inline]
fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

#[inline]
fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::inode_address;

    fn store(disk: &mut Disk, inode: &DiskInode, inode_num: INodeNum) {
        let (record, indirect_blocks) = inode.to_bytes();
        disk.write(inode_address(inode_num), &record);
        for (block, data) in indirect_blocks {
            disk.write(block_address(block), &data);
        }
    }

    #[test]
    fn fresh_inode_has_no_blocks() {
        let inode = DiskInode::new(InodeKind::File, 0o644, 1000, 1000);
        assert_eq!(inode.mode, 0o100644);
        assert_eq!(inode.size, 0);
        assert!(inode.direct.iter().all(|&b| b == 0));
        assert_eq!(inode.indirect, IndirectTable::NotAllocated);
        assert!(inode.referenced_blocks().is_empty());
        assert!(!inode.is_dir());
    }

    #[test]
    fn record_layout() {
        let mut inode = DiskInode::new(InodeKind::Directory, 0o755, 0x0102, 0x0304);
        inode.size = 0x0A0B0C0D;
        inode.direct[0] = 0x1122;
        inode.direct[9] = 0x3344;

        let (bytes, indirect_blocks) = inode.to_bytes();
        assert_eq!(&bytes[0..4], &0o040755u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0x02, 0x01, 0x04, 0x03]);
        assert_eq!(&bytes[8..12], &[0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(&bytes[20..22], &[0x22, 0x11]);
        assert_eq!(&bytes[38..40], &[0x44, 0x33]);
        assert_eq!(&bytes[40..], &[0; 24]);
        assert!(indirect_blocks.is_empty());
        assert!(inode.is_dir());
    }

    #[test]
    fn indirect_table_is_loaded_eagerly() {
        let mut disk = Disk::new();
        let mut inode = DiskInode::new(InodeKind::File, 0o600, 1, 2);
        inode.direct = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        inode.expand_indirect_addresses(&[11]).unwrap();
        *inode.indirect.get_mut(0).unwrap() = 12;
        *inode.indirect.get_mut(511).unwrap() = 13;
        inode.size = 10 * BLOCK_SIZE as u32 + 5;
        store(&mut disk, &inode, 7);

        let loaded = DiskInode::read_from_disk(&disk, 7);
        assert_eq!(loaded, inode);
        assert_eq!(loaded.indirect.block(), 11);
        assert_eq!(loaded.indirect.get(511), 13);
        assert_eq!(
            loaded.referenced_blocks(),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]
        );
    }

    #[test]
    fn only_one_indirect_block() {
        let mut inode = DiskInode::new(InodeKind::File, 0o600, 0, 0);
        assert!(matches!(
            inode.expand_indirect_addresses(&[3, 4]),
            Err(Error::CapacityExceeded)
        ));
        inode.expand_indirect_addresses(&[3]).unwrap();
        assert!(matches!(
            inode.expand_indirect_addresses(&[4]),
            Err(Error::CapacityExceeded)
        ));
        assert_eq!(inode.indirect.block(), 3);
    }

    #[test]
    fn truncate_drops_tail_blocks() {
        let mut inode = DiskInode::new(InodeKind::File, 0o600, 0, 0);
        inode.direct = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        inode.expand_indirect_addresses(&[11]).unwrap();
        *inode.indirect.get_mut(0).unwrap() = 12;
        *inode.indirect.get_mut(1).unwrap() = 13;
        inode.size = 12 * BLOCK_SIZE as u32;

        assert_eq!(inode.truncate_blocks(11 * BLOCK_SIZE as u32 - 1), vec![13]);
        assert_eq!(inode.truncate_blocks(2 * BLOCK_SIZE as u32 + 1), vec![4, 5, 6, 7, 8, 9, 10, 12, 11]);
        assert_eq!(inode.indirect, IndirectTable::NotAllocated);
        assert_eq!(inode.referenced_blocks(), vec![1, 2, 3]);
        assert_eq!(inode.size, 2 * BLOCK_SIZE as u32 + 1);

        assert!(inode.truncate_blocks(100 * BLOCK_SIZE as u32).is_empty());
        assert_eq!(inode.size, 100 * BLOCK_SIZE as u32);
    }
}
