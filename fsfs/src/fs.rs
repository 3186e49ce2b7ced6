//! # 磁盘管理器层
//!
//! 在内存磁盘之上维护超级块与两张位图，负责 inode 与数据块的分配、回收，
//! 以及按字节读写文件数据。
//!
//! 位图与超级块的每一次修改都立即写回磁盘字节，
//! 因此任何时刻把磁盘整体落盘得到的都是一致的映像。

use std::path::Path as HostPath;

use log::{debug, info, warn};

use crate::config::{
    BLOCKS_BITMAP_SIZE, BLOCKS_BITMAP_START, BLOCK_SIZE, DATA_BLOCKS, DATA_INODES,
    DIRECT_ADDRESS_NUM, FILE_SIZE_MAX, INODES_BITMAP_SIZE, INODES_BITMAP_START,
    INODE_SIZE, SUPER_BLOCK_SIZE,
};
use crate::cursor::Cursor;
use crate::disk::Disk;
use crate::layout::{
    block_address, inode_address, Bitmap, Dir, DirEntry, DiskInode, IndirectTable, InodeKind,
    SuperBlock,
};
use crate::path::Path;
use crate::{BlockNum, Error, INodeNum, Result};

/// 根目录的 inode 编号
pub const ROOT_INODE_NUM: INodeNum = 0;
/// 根目录的权限位
pub const ROOT_PERM: u32 = 0o775;

#[derive(Debug)]
pub struct FileSystem {
    disk: Disk,
    super_block: SuperBlock,
    inode_bitmap: Bitmap,
    block_bitmap: Bitmap,
}

impl FileSystem {
    /// 在空白磁盘上建立文件系统，只含根目录
    pub fn create(uid: u16, gid: u16) -> Result<Self> {
        let mut fs = Self::from_disk(Disk::new());

        let root = fs.alloc_inode()?;
        debug_assert_eq!(root, ROOT_INODE_NUM);
        let mut root_inode = DiskInode::new(InodeKind::Directory, ROOT_PERM, uid, gid);
        fs.write_dir(&mut root_inode, root, &Dir::new(root, root))?;

        info!("created fsfs, root owned by {uid}:{gid}");
        Ok(fs)
    }

    /// 从宿主文件载入映像
    pub fn open(path: impl AsRef<HostPath>) -> Result<Self> {
        let path = path.as_ref();
        let fs = Self::from_disk(Disk::load(path)?);
        if !fs.inode_bitmap.is_set(ROOT_INODE_NUM as usize) {
            return Err(Error::Corrupted("root inode is not allocated"));
        }

        info!(
            "opened {}: {} inodes, {} blocks in use",
            path.display(),
            fs.super_block.used_inodes,
            fs.super_block.used_blocks
        );
        Ok(fs)
    }

    /// 解释磁盘上的超级块与位图。
    ///
    /// 以位图为准：超级块计数与位图不符时按位图修正。
    pub fn from_disk(mut disk: Disk) -> Self {
        let super_block = SuperBlock::from_bytes(disk.bytes(0..SUPER_BLOCK_SIZE));
        let inode_bitmap = Bitmap::from_bytes(
            disk.bytes(INODES_BITMAP_START..INODES_BITMAP_START + INODES_BITMAP_SIZE),
            DATA_INODES,
            0,
        );
        let block_bitmap = Bitmap::from_bytes(
            disk.bytes(BLOCKS_BITMAP_START..BLOCKS_BITMAP_START + BLOCKS_BITMAP_SIZE),
            DATA_BLOCKS,
            1,
        );

        let counted = SuperBlock {
            used_blocks: block_bitmap.count() as u16,
            used_inodes: inode_bitmap.count() as u16,
        };
        if counted != super_block {
            warn!("super block {super_block:?} disagrees with bitmaps {counted:?}, fixing");
            disk.write(0, &counted.to_bytes());
        }

        Self {
            disk,
            super_block: counted,
            inode_bitmap,
            block_bitmap,
        }
    }

    /// 整个映像写回宿主文件
    pub fn save(&self, path: impl AsRef<HostPath>) -> Result<()> {
        let path = path.as_ref();
        self.disk.save(path)?;
        info!("saved image to {}", path.display());
        Ok(())
    }

    #[inline]
    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    #[inline]
    pub fn super_block(&self) -> SuperBlock {
        self.super_block
    }

    /// 块编号是否已分配，0 与越界编号视为未分配
    #[inline]
    pub fn is_block_allocated(&self, block: BlockNum) -> bool {
        (1..=DATA_BLOCKS).contains(&(block as usize)) && self.block_bitmap.is_set(block as usize)
    }

    #[inline]
    pub fn is_inode_allocated(&self, inode_num: INodeNum) -> bool {
        (inode_num as usize) < DATA_INODES && self.inode_bitmap.is_set(inode_num as usize)
    }

    /// 首次适配分配数据块
    pub fn alloc_block(&mut self) -> Result<BlockNum> {
        let block = self.block_bitmap.find_free(0)?;
        self.block_bitmap.set(block);
        self.super_block.used_blocks += 1;
        self.sync_block_bit(block);
        self.sync_super_block();

        debug!("alloc block {block}");
        Ok(block as BlockNum)
    }

    /// 回收数据块并将其清零，新分配的块因此总是读出零
    pub fn free_block(&mut self, block: BlockNum) {
        debug_assert_ne!(block, 0);
        self.block_bitmap.reset(block as usize);
        self.super_block.used_blocks -= 1;
        self.sync_block_bit(block as usize);
        self.sync_super_block();

        let addr = block_address(block);
        self.disk.zero(addr..addr + BLOCK_SIZE);
        debug!("free block {block}");
    }

    /// 首次适配分配 inode，记录内容由调用者写入
    pub fn alloc_inode(&mut self) -> Result<INodeNum> {
        let inode_num = self.inode_bitmap.find_free(0)?;
        self.inode_bitmap.set(inode_num);
        self.super_block.used_inodes += 1;
        self.sync_inode_bit(inode_num);
        self.sync_super_block();

        debug!("alloc inode {inode_num}");
        Ok(inode_num as INodeNum)
    }

    /// 回收 inode 并清零其记录
    pub fn free_inode(&mut self, inode_num: INodeNum) {
        self.inode_bitmap.reset(inode_num as usize);
        self.super_block.used_inodes -= 1;
        self.sync_inode_bit(inode_num as usize);
        self.sync_super_block();

        let addr = inode_address(inode_num);
        self.disk.zero(addr..addr + INODE_SIZE);
        debug!("free inode {inode_num}");
    }

    /// 回收 inode 及其引用的全部数据块（含间接索引块）
    pub fn free_inode_and_blocks(&mut self, inode_num: INodeNum) {
        let disk_inode = self.read_inode(inode_num);
        for block in disk_inode.referenced_blocks() {
            self.free_block(block);
        }
        self.free_inode(inode_num);
    }

    #[inline]
    pub fn read_inode(&self, inode_num: INodeNum) -> DiskInode {
        DiskInode::read_from_disk(&self.disk, inode_num)
    }

    /// 写回 inode 记录，以及它的间接索引块
    pub fn write_inode(&mut self, disk_inode: &DiskInode, inode_num: INodeNum) {
        let (record, indirect_blocks) = disk_inode.to_bytes();
        self.disk.write(inode_address(inode_num), &record);
        for (block, data) in indirect_blocks {
            self.disk.write(block_address(block), &data);
        }
    }

    /// 读出目录 inode 的全部目录项
    pub fn read_dir(&self, inode_num: INodeNum) -> Result<Dir> {
        let disk_inode = self.read_inode(inode_num);
        if !disk_inode.is_dir() {
            return Err(Error::NotADirectory);
        }

        let bytes = self.read_bytes(&disk_inode, inode_num, 0, disk_inode.size as usize)?;
        Dir::from_bytes(&bytes)
    }

    /// 重写目录数据并写回 inode，目录大小随之变为`dir.size()`。
    ///
    /// 写入前先确认空间足够，失败时目录保持原样。
    pub fn write_dir(
        &mut self,
        disk_inode: &mut DiskInode,
        inode_num: INodeNum,
        dir: &Dir,
    ) -> Result<()> {
        let bytes = dir.to_bytes();
        self.reserve(disk_inode, bytes.len())?;

        let result = self
            .write_bytes(disk_inode, inode_num, 0, &bytes)
            .and_then(|_| {
                // 目录变短：回收多余的块，末尾残留的旧记录清零
                if bytes.len() < disk_inode.size as usize {
                    self.truncate(disk_inode, inode_num, bytes.len() as u32)
                } else {
                    Ok(())
                }
            });
        self.write_inode(disk_inode, inode_num);

        result
    }

    /// 按路径查找目录项；根目录没有目录项，返回`InvalidPath`
    pub fn resolve(&self, path: &str) -> Result<DirEntry> {
        let cmps: Vec<&str> = path.components().collect();
        let (file, parents) = cmps.split_last().ok_or(Error::InvalidPath)?;

        let mut dir = self.read_dir(ROOT_INODE_NUM)?;
        for cmp in parents {
            let entry = dir.find_entry(cmp)?;
            dir = self.read_dir(entry.inode_num)?;
        }

        dir.find_entry(file).cloned()
    }

    /// 按路径查找 inode 编号，根目录也可以
    pub fn lookup_path(&self, path: &str) -> Result<INodeNum> {
        if path.components().next().is_none() {
            return Ok(ROOT_INODE_NUM);
        }
        self.resolve(path).map(|entry| entry.inode_num)
    }

    /// 从`offset`开始读至多`len`个字节，不越过文件末尾；空洞读出零
    pub fn read_bytes(
        &self,
        disk_inode: &DiskInode,
        inode_num: INodeNum,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>> {
        let end = if offset.saturating_add(len) >= disk_inode.size as usize {
            Cursor::end(inode_num, disk_inode)
        } else {
            Cursor::at(inode_num, offset + len)
        };
        let mut cursor = Cursor::at(inode_num, offset);
        if cursor.position() >= end.position() {
            return Ok(Vec::new());
        }

        let mut data = Vec::with_capacity(end.position() - cursor.position());
        while cursor != end {
            let len = cursor
                .remaining_in_block()
                .min(end.position() - cursor.position());
            match cursor.resolve(disk_inode)? {
                // 空洞不读盘，0 号数据槽的内容不可信
                0 => data.resize(data.len() + len, 0),
                block => {
                    let addr = block_address(block) + cursor.offset();
                    data.extend_from_slice(self.disk.bytes(addr..addr + len));
                }
            }
            cursor.advance_by(len);
        }

        Ok(data)
    }

    /// 从`offset`开始写入`data`，按需分配数据块，返回写入的字节数。
    ///
    /// 中途出错时，已写入的部分保留，文件大小只覆盖到已写入处，
    /// 调用者仍需写回 inode 以保存已分配的块。
    pub fn write_bytes(
        &mut self,
        disk_inode: &mut DiskInode,
        inode_num: INodeNum,
        offset: usize,
        data: &[u8],
    ) -> Result<usize> {
        let (written, result) = self.write_prefix(disk_inode, inode_num, offset, data);
        result.map(|()| written)
    }

    /// 同 [`write_bytes`](Self::write_bytes)，但出错时也给出已写入的字节数
    pub fn write_prefix(
        &mut self,
        disk_inode: &mut DiskInode,
        inode_num: INodeNum,
        offset: usize,
        data: &[u8],
    ) -> (usize, Result<()>) {
        let mut cursor = Cursor::at(inode_num, offset);
        let mut written = 0;

        let result = loop {
            if written == data.len() {
                break Ok(());
            }

            let block = match cursor.resolve_mut(disk_inode, || self.alloc_block()) {
                Ok(block) => block,
                Err(err) => break Err(err),
            };
            let len = cursor.remaining_in_block().min(data.len() - written);
            self.disk.write(
                block_address(block) + cursor.offset(),
                &data[written..written + len],
            );
            written += len;
            cursor.advance_by(len);
        };

        if written > 0 {
            disk_inode.size = disk_inode.size.max((offset + written) as u32);
            disk_inode.touch();
        }
        if let Err(err) = &result {
            warn!("inode {inode_num}: write stopped after {written} bytes: {err}");
        }

        (written, result)
    }

    /// 改变文件大小。
    ///
    /// 缩小时回收多余的块，并把保留的最后一块中超出新大小的部分清零；
    /// 增大时只改大小，新增部分是空洞。
    pub fn truncate(
        &mut self,
        disk_inode: &mut DiskInode,
        inode_num: INodeNum,
        new_size: u32,
    ) -> Result<()> {
        if new_size as usize > FILE_SIZE_MAX {
            return Err(Error::CapacityExceeded);
        }

        if new_size < disk_inode.size {
            let tail = Cursor::at(inode_num, new_size as usize);
            if tail.offset() != 0 {
                let block = tail.resolve(disk_inode)?;
                if block != 0 {
                    let addr = block_address(block) + tail.offset();
                    self.disk.zero(addr..addr + tail.remaining_in_block());
                }
            }
        }

        for block in disk_inode.truncate_blocks(new_size) {
            self.free_block(block);
        }
        disk_inode.touch();
        debug!("inode {inode_num} truncated to {new_size}");

        Ok(())
    }

    /// 文件增长到`size`字节还需要分配多少块（含间接索引块），超出上限则报错
    pub fn blocks_needed(&self, disk_inode: &DiskInode, size: usize) -> Result<usize> {
        if size > FILE_SIZE_MAX {
            return Err(Error::CapacityExceeded);
        }

        let blocks = size.div_ceil(BLOCK_SIZE);
        let mut needed = disk_inode
            .direct
            .iter()
            .take(blocks)
            .filter(|&&block| block == 0)
            .count();
        if blocks > DIRECT_ADDRESS_NUM {
            let indirect = blocks - DIRECT_ADDRESS_NUM;
            needed += match &disk_inode.indirect {
                IndirectTable::NotAllocated => indirect + 1,
                IndirectTable::Loaded { table, .. } => {
                    table.iter().take(indirect).filter(|&&block| block == 0).count()
                }
            };
        }

        Ok(needed)
    }

    /// 确认有足够的空闲块让文件增长到`size`字节
    pub fn reserve(&self, disk_inode: &DiskInode, size: usize) -> Result<()> {
        let needed = self.blocks_needed(disk_inode, size)?;
        if needed > self.free_blocks() {
            return Err(Error::ResourceExhausted);
        }
        Ok(())
    }

    #[inline]
    pub fn free_blocks(&self) -> usize {
        DATA_BLOCKS - self.super_block.used_blocks as usize
    }

    #[inline]
    pub fn free_inodes(&self) -> usize {
        DATA_INODES - self.super_block.used_inodes as usize
    }

    /// 整个文件系统的使用情况
    pub fn mount_stats(&self) -> vfs::StatFs {
        vfs::StatFs {
            block_size: BLOCK_SIZE as u32,
            blocks: DATA_BLOCKS as u64,
            free_blocks: self.free_blocks() as u64,
            files: DATA_INODES as u64,
            free_files: self.free_inodes() as u64,
            name_max: DirEntry::max_name_len() as u32,
        }
    }
}

impl FileSystem {
    #[inline]
    fn sync_super_block(&mut self) {
        self.disk.write(0, &self.super_block.to_bytes());
    }

    #[inline]
    fn sync_inode_bit(&mut self, inode_num: usize) {
        let index = self.inode_bitmap.byte_index(inode_num);
        let byte = self.inode_bitmap.byte(index);
        self.disk.write(INODES_BITMAP_START + index, &[byte]);
    }

    #[inline]
    fn sync_block_bit(&mut self, block: usize) {
        let index = self.block_bitmap.byte_index(block);
        let byte = self.block_bitmap.byte(index);
        self.disk.write(BLOCKS_BITMAP_START + index, &[byte]);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn new_file(fs: &mut FileSystem) -> (INodeNum, DiskInode) {
        let inode_num = fs.alloc_inode().unwrap();
        let disk_inode = DiskInode::new(InodeKind::File, 0o644, 0, 0);
        fs.write_inode(&disk_inode, inode_num);
        (inode_num, disk_inode)
    }

    #[test]
    fn fresh_fs_has_root_only() {
        let fs = FileSystem::create(1000, 100).unwrap();
        assert_eq!(fs.super_block().used_inodes, 1);
        assert_eq!(fs.super_block().used_blocks, 1);

        let root = fs.read_inode(ROOT_INODE_NUM);
        assert_eq!(root.mode, 0o040775);
        assert_eq!((root.uid, root.gid), (1000, 100));
        assert_eq!(root.direct[0], 1);

        let dir = fs.read_dir(ROOT_INODE_NUM).unwrap();
        assert_eq!(root.size as usize, dir.size());
        assert_eq!(dir.find_entry(".").unwrap().inode_num, ROOT_INODE_NUM);
        assert_eq!(dir.find_entry("..").unwrap().inode_num, ROOT_INODE_NUM);
        assert_eq!(fs.lookup_path("/").unwrap(), ROOT_INODE_NUM);
        assert!(matches!(fs.resolve("/"), Err(Error::InvalidPath)));
    }

    #[test]
    fn allocation_is_exclusive_and_first_fit() {
        let mut fs = FileSystem::create(0, 0).unwrap();
        let mut live: HashSet<BlockNum> = HashSet::new();
        live.insert(fs.read_inode(ROOT_INODE_NUM).direct[0]);

        for round in 0..40 {
            for _ in 0..7 {
                let block = fs.alloc_block().unwrap();
                assert_ne!(block, 0);
                assert!(live.insert(block), "block {block} handed out twice");
                let addr = block_address(block);
                fs.disk.write(addr, &[round as u8 + 1; BLOCK_SIZE]);
            }

            let mut doomed: Vec<_> = live.iter().copied().filter(|b| b % 3 == round % 3).collect();
            doomed.sort_unstable();
            for block in doomed.into_iter().filter(|&b| b != 1).take(3) {
                fs.free_block(block);
                live.remove(&block);
                let addr = block_address(block);
                assert!(fs.disk().bytes(addr..addr + BLOCK_SIZE).iter().all(|&b| b == 0));
            }

            assert_eq!(fs.super_block().used_blocks as usize, live.len());
            for &block in &live {
                assert!(fs.is_block_allocated(block));
            }
        }

        let lowest_free = (1..).find(|b| !live.contains(b)).unwrap();
        assert_eq!(fs.alloc_block().unwrap(), lowest_free);

        let inode = fs.alloc_inode().unwrap();
        assert_eq!(inode, 1);
        fs.free_inode(inode);
        assert_eq!(fs.alloc_inode().unwrap(), 1);
    }

    #[test]
    fn bookkeeping_is_written_through() {
        let mut fs = FileSystem::create(0, 0).unwrap();
        for _ in 0..9 {
            fs.alloc_block().unwrap();
        }
        fs.alloc_inode().unwrap();

        let disk = fs.disk();
        assert_eq!(SuperBlock::from_bytes(disk.bytes(0..4)), fs.super_block());
        assert_eq!(disk.bytes(BLOCKS_BITMAP_START..BLOCKS_BITMAP_START + 2), &[0xFF, 0x03]);
        assert_eq!(disk.bytes(INODES_BITMAP_START..INODES_BITMAP_START + 1), &[0x03]);
    }

    #[test]
    fn freed_block_reads_zero() {
        let mut fs = FileSystem::create(0, 0).unwrap();
        let (inode_num, mut disk_inode) = new_file(&mut fs);
        fs.write_bytes(&mut disk_inode, inode_num, 0, &[0xAA; 3000])
            .unwrap();
        let blocks = disk_inode.referenced_blocks();
        assert_eq!(blocks.len(), 3);

        fs.write_inode(&disk_inode, inode_num);
        fs.free_inode_and_blocks(inode_num);
        for block in blocks {
            let addr = block_address(block);
            assert!(fs.disk().bytes(addr..addr + BLOCK_SIZE).iter().all(|&b| b == 0));
        }
        assert_eq!(fs.super_block().used_blocks, 1);
        assert_eq!(fs.super_block().used_inodes, 1);
    }

    #[test]
    fn freed_inode_record_is_zeroed() {
        let mut fs = FileSystem::create(0, 0).unwrap();
        let (inode_num, mut disk_inode) = new_file(&mut fs);
        fs.write_bytes(&mut disk_inode, inode_num, 0, &[0x11; 20000])
            .unwrap();
        fs.write_inode(&disk_inode, inode_num);
        let addr = inode_address(inode_num);
        assert!(fs.disk().bytes(addr..addr + INODE_SIZE).iter().any(|&b| b != 0));

        fs.free_inode_and_blocks(inode_num);
        assert!(fs.disk().bytes(addr..addr + INODE_SIZE).iter().all(|&b| b == 0));
        assert!(!fs.is_inode_allocated(inode_num));
        assert_eq!(fs.super_block().used_blocks, 1);
        assert_eq!(fs.super_block().used_inodes, 1);
    }

    #[test]
    fn holes_ignore_data_slot_zero() {
        let fs = FileSystem::create(0, 0).unwrap();
        let mut bytes = fs.disk().as_bytes().to_vec();
        let slot_zero = block_address(0);
        bytes[slot_zero..slot_zero + BLOCK_SIZE].fill(0xCC);

        let path = std::env::temp_dir().join(format!("fsfs-fs-slot0-{}.img", std::process::id()));
        std::fs::write(&path, &bytes).unwrap();
        let mut fs = FileSystem::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let (inode_num, mut disk_inode) = new_file(&mut fs);
        fs.truncate(&mut disk_inode, inode_num, 8).unwrap();
        assert_eq!(fs.read_bytes(&disk_inode, inode_num, 0, 8).unwrap(), [0; 8]);

        fs.write_bytes(&mut disk_inode, inode_num, 2 * BLOCK_SIZE, b"x")
            .unwrap();
        let data = fs
            .read_bytes(&disk_inode, inode_num, 0, 2 * BLOCK_SIZE + 1)
            .unwrap();
        assert!(data[..2 * BLOCK_SIZE].iter().all(|&b| b == 0));
        assert_eq!(data[2 * BLOCK_SIZE], b'x');
    }

    #[test]
    fn holes_read_as_zero() {
        let mut fs = FileSystem::create(0, 0).unwrap();
        let (inode_num, mut disk_inode) = new_file(&mut fs);
        let offset = 12 * BLOCK_SIZE + 7;
        assert_eq!(
            fs.write_bytes(&mut disk_inode, inode_num, offset, b"tail").unwrap(),
            4
        );
        assert_eq!(disk_inode.size as usize, offset + 4);
        // 一个数据块加一个间接索引块
        assert_eq!(disk_inode.referenced_blocks().len(), 2);

        let data = fs
            .read_bytes(&disk_inode, inode_num, 0, offset + 100)
            .unwrap();
        assert_eq!(data.len(), offset + 4);
        assert!(data[..offset].iter().all(|&b| b == 0));
        assert_eq!(&data[offset..], b"tail");
    }

    #[test]
    fn read_stops_at_end_of_file() {
        let mut fs = FileSystem::create(0, 0).unwrap();
        let (inode_num, mut disk_inode) = new_file(&mut fs);
        fs.write_bytes(&mut disk_inode, inode_num, 0, b"hello world")
            .unwrap();

        assert_eq!(fs.read_bytes(&disk_inode, inode_num, 6, 100).unwrap(), b"world");
        assert!(fs.read_bytes(&disk_inode, inode_num, 11, 5).unwrap().is_empty());
        assert!(fs.read_bytes(&disk_inode, inode_num, 50, 5).unwrap().is_empty());
    }

    #[test]
    fn exhausted_write_keeps_committed_prefix() {
        let mut fs = FileSystem::create(0, 0).unwrap();
        let (inode_num, mut disk_inode) = new_file(&mut fs);
        while fs.free_blocks() > 2 {
            fs.alloc_block().unwrap();
        }

        let data = vec![0x5A; 3 * BLOCK_SIZE];
        assert!(matches!(
            fs.write_bytes(&mut disk_inode, inode_num, 0, &data),
            Err(Error::ResourceExhausted)
        ));
        assert_eq!(disk_inode.size as usize, 2 * BLOCK_SIZE);
        assert_eq!(disk_inode.referenced_blocks().len(), 2);
        assert_eq!(fs.free_blocks(), 0);
        assert!(matches!(
            fs.reserve(&disk_inode, 3 * BLOCK_SIZE),
            Err(Error::ResourceExhausted)
        ));
    }

    #[test]
    fn truncate_zeroes_dropped_tail() {
        let mut fs = FileSystem::create(0, 0).unwrap();
        let (inode_num, mut disk_inode) = new_file(&mut fs);
        fs.write_bytes(&mut disk_inode, inode_num, 0, &[7; 2 * BLOCK_SIZE])
            .unwrap();

        fs.truncate(&mut disk_inode, inode_num, 100).unwrap();
        assert_eq!(disk_inode.size, 100);
        assert_eq!(disk_inode.referenced_blocks().len(), 1);
        assert_eq!(fs.super_block().used_blocks, 2);

        fs.truncate(&mut disk_inode, inode_num, 300).unwrap();
        let data = fs.read_bytes(&disk_inode, inode_num, 0, 300).unwrap();
        assert!(data[..100].iter().all(|&b| b == 7));
        assert!(data[100..].iter().all(|&b| b == 0));

        assert!(matches!(
            fs.truncate(&mut disk_inode, inode_num, FILE_SIZE_MAX as u32 + 1),
            Err(Error::CapacityExceeded)
        ));
    }

    #[test]
    fn blocks_needed_counts_indirect_table() {
        let fs = FileSystem::create(0, 0).unwrap();
        let disk_inode = DiskInode::new(InodeKind::File, 0o644, 0, 0);
        assert_eq!(fs.blocks_needed(&disk_inode, 0).unwrap(), 0);
        assert_eq!(fs.blocks_needed(&disk_inode, 1).unwrap(), 1);
        assert_eq!(fs.blocks_needed(&disk_inode, 11 * BLOCK_SIZE).unwrap(), 12);
        assert_eq!(fs.blocks_needed(&disk_inode, FILE_SIZE_MAX).unwrap(), 523);
        assert!(matches!(
            fs.blocks_needed(&disk_inode, FILE_SIZE_MAX + 1),
            Err(Error::CapacityExceeded)
        ));
    }

    #[test]
    fn stale_counters_are_fixed_on_load() {
        let fs = FileSystem::create(0, 0).unwrap();
        let mut bytes = fs.disk().as_bytes().to_vec();
        bytes[0] = 99;

        let path = std::env::temp_dir().join(format!("fsfs-fs-stale-{}.img", std::process::id()));
        std::fs::write(&path, &bytes).unwrap();
        let loaded = FileSystem::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.super_block(), fs.super_block());
        assert_eq!(loaded.disk().bytes(0..4), &fs.super_block().to_bytes());
    }
}
