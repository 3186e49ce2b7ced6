//! # 文件数据游标
//!
//! 游标只记录位置：属于哪个 inode、落在哪个索引项、块内偏移，
//! 本身不持有对磁盘或 inode 的引用，可以随意复制、比较。
//!
//! 前进（[`Cursor::advance`]）是纯粹的位置运算；
//! 解析（[`Cursor::resolve`] / [`Cursor::resolve_mut`]）才会去查 inode 的索引，
//! 其中写游标在遇到空洞时分配新块。

use log::trace;

use crate::config::{BLOCK_SIZE, DIRECT_ADDRESS_NUM, INDIRECT_BLOCK_ADDRESS_NUM};
use crate::layout::{DiskInode, IndirectTable};
use crate::{BlockNum, Error, INodeNum, Result};

/// 当前字节所在块由哪一个索引项给出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    /// 第`i`个直接索引
    Direct(usize),
    /// 间接索引块里的第`i`项
    Indirect(usize),
}

impl BlockRef {
    /// 文件内第`block_index`个数据块对应的索引项
    #[inline]
    pub fn of(block_index: usize) -> Self {
        if block_index < DIRECT_ADDRESS_NUM {
            Self::Direct(block_index)
        } else {
            Self::Indirect(block_index - DIRECT_ADDRESS_NUM)
        }
    }

    /// 文件内的块序号
    #[inline]
    pub fn block_index(self) -> usize {
        match self {
            Self::Direct(i) => i,
            Self::Indirect(i) => DIRECT_ADDRESS_NUM + i,
        }
    }

    /// 直接索引用尽后转入间接索引
    #[inline]
    fn next(self) -> Self {
        match self {
            Self::Direct(i) if i + 1 < DIRECT_ADDRESS_NUM => Self::Direct(i + 1),
            Self::Direct(_) => Self::Indirect(0),
            Self::Indirect(i) => Self::Indirect(i + 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    inode: INodeNum,
    block: BlockRef,
    /// 块内偏移
    offset: usize,
}

impl Cursor {
    /// 指向文件第`pos`个字节
    pub fn at(inode: INodeNum, pos: usize) -> Self {
        Self {
            inode,
            block: BlockRef::of(pos / BLOCK_SIZE),
            offset: pos % BLOCK_SIZE,
        }
    }

    #[inline]
    pub fn begin(inode: INodeNum) -> Self {
        Self::at(inode, 0)
    }

    /// 文件末尾，由 inode 的逻辑大小直接算出
    #[inline]
    pub fn end(inode: INodeNum, disk_inode: &DiskInode) -> Self {
        Self::at(inode, disk_inode.size as usize)
    }

    #[inline]
    pub fn block_ref(&self) -> BlockRef {
        self.block
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 文件内的字节位置
    #[inline]
    pub fn position(&self) -> usize {
        self.block.block_index() * BLOCK_SIZE + self.offset
    }

    /// 当前块内还剩多少字节
    #[inline]
    pub fn remaining_in_block(&self) -> usize {
        BLOCK_SIZE - self.offset
    }

    /// 前进一个字节
    pub fn advance(&mut self) {
        self.offset += 1;
        if self.offset == BLOCK_SIZE {
            self.offset = 0;
            self.block = self.block.next();
        }
    }

    /// 前进`n`个字节
    #[inline]
    pub fn advance_by(&mut self, n: usize) {
        *self = Self::at(self.inode, self.position() + n);
    }

    /// 只读解析：返回当前位置所在的块编号，空洞为 0，从不分配
    pub fn resolve(&self, disk_inode: &DiskInode) -> Result<BlockNum> {
        match self.block {
            BlockRef::Direct(i) => Ok(disk_inode.direct[i]),
            BlockRef::Indirect(i) if i < INDIRECT_BLOCK_ADDRESS_NUM => {
                Ok(disk_inode.indirect.get(i))
            }
            BlockRef::Indirect(_) => Err(Error::CapacityExceeded),
        }
    }

    /// 写解析：保证间接索引块存在、当前索引项非零，必要时通过`alloc`分配新块
    pub fn resolve_mut(
        &self,
        disk_inode: &mut DiskInode,
        mut alloc: impl FnMut() -> Result<BlockNum>,
    ) -> Result<BlockNum> {
        let slot = match self.block {
            BlockRef::Direct(i) => &mut disk_inode.direct[i],
            BlockRef::Indirect(i) if i < INDIRECT_BLOCK_ADDRESS_NUM => {
                if disk_inode.indirect == IndirectTable::NotAllocated {
                    let indirect_block = alloc()?;
                    trace!("inode {} indirect table -> block {indirect_block}", self.inode);
                    disk_inode.expand_indirect_addresses(&[indirect_block])?;
                }
                disk_inode
                    .indirect
                    .get_mut(i)
                    .ok_or(Error::CapacityExceeded)?
            }
            BlockRef::Indirect(_) => return Err(Error::CapacityExceeded),
        };

        if *slot == 0 {
            *slot = alloc()?;
            trace!("inode {} {:?} -> block {}", self.inode, self.block, *slot);
        }

        Ok(*slot)
    }
}
