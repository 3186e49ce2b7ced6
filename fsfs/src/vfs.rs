//! # 索引节点层
//!
//! 确立文件系统的操作逻辑：通过 [`Inode`] 句柄在文件树上创建、查找、读写、删除。
//! 句柄只是一个 inode 编号，每个操作都借用一次 [`FileSystem`]。
//!
//! 本层末尾另有一组按路径操作的接口，供宿主直接使用。

use log::debug;
use vfs::{DirEntryType, Stat};

use crate::fs::{FileSystem, ROOT_INODE_NUM};
use crate::layout::{Dir, DirEntry, DiskInode, InodeKind};
use crate::path::Path;
use crate::{Error, INodeNum, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inode {
    inode_num: INodeNum,
}

/// 待修改的属性，`None`表示保持不变
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetAttr {
    /// 只取权限位，类型位不可修改
    pub mode: Option<u32>,
    pub uid: Option<u16>,
    pub gid: Option<u16>,
    /// 截断或扩展到指定大小
    pub size: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
}

impl Inode {
    pub const ROOT: Self = Self::new(ROOT_INODE_NUM);

    #[inline]
    pub const fn new(inode_num: INodeNum) -> Self {
        Self { inode_num }
    }

    #[inline]
    pub fn inode_num(&self) -> INodeNum {
        self.inode_num
    }

    #[inline]
    pub fn is_dir(&self, fs: &FileSystem) -> bool {
        fs.read_inode(self.inode_num).is_dir()
    }

    pub fn stat(&self, fs: &FileSystem) -> Stat {
        let disk_inode = fs.read_inode(self.inode_num);

        Stat {
            inode: self.inode_num as u64,
            kind: entry_type(&disk_inode),
            mode: disk_inode.mode,
            uid: disk_inode.uid,
            gid: disk_inode.gid,
            size: disk_inode.size as u64,
            blocks: disk_inode.referenced_blocks().len() as u64,
            atime: disk_inode.atime,
            mtime: disk_inode.mtime,
        }
    }

    /// 在当前目录下按名字查找
    pub fn find(&self, name: &str, fs: &FileSystem) -> Result<Self> {
        fs.read_dir(self.inode_num)?
            .find_entry(name)
            .map(|entry| Self::new(entry.inode_num))
    }

    /// 列出目录项，含`.`与`..`
    pub fn read_dir(&self, fs: &FileSystem) -> Result<Vec<vfs::DirEntry>> {
        let dir = fs.read_dir(self.inode_num)?;

        Ok(dir
            .entries()
            .iter()
            .map(|entry| vfs::DirEntry {
                inode: entry.inode_num as u64,
                ty: entry_type(&fs.read_inode(entry.inode_num)),
                name: entry.name.clone(),
            })
            .collect())
    }

    pub fn read_at(&self, offset: usize, len: usize, fs: &FileSystem) -> Result<Vec<u8>> {
        let disk_inode = fs.read_inode(self.inode_num);
        if disk_inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        fs.read_bytes(&disk_inode, self.inode_num, offset, len)
    }

    /// 写入数据，返回写入的字节数；出错时已写入的部分仍然保留
    pub fn write_at(&self, offset: usize, data: &[u8], fs: &mut FileSystem) -> Result<usize> {
        let mut disk_inode = fs.read_inode(self.inode_num);
        if disk_inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        let result = fs.write_bytes(&mut disk_inode, self.inode_num, offset, data);
        fs.write_inode(&disk_inode, self.inode_num);
        result
    }

    /// 短写：已写入一部分后出错，返回已写入的字节数，错误留给下一次写入
    pub fn write_some(&self, offset: usize, data: &[u8], fs: &mut FileSystem) -> Result<usize> {
        let mut disk_inode = fs.read_inode(self.inode_num);
        if disk_inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        let (written, result) = fs.write_prefix(&mut disk_inode, self.inode_num, offset, data);
        fs.write_inode(&disk_inode, self.inode_num);
        match result {
            Err(err) if written == 0 => Err(err),
            _ => Ok(written),
        }
    }

    pub fn truncate(&self, size: u32, fs: &mut FileSystem) -> Result<()> {
        let mut disk_inode = fs.read_inode(self.inode_num);
        if disk_inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        fs.truncate(&mut disk_inode, self.inode_num, size)?;
        fs.write_inode(&disk_inode, self.inode_num);
        Ok(())
    }

    pub fn set_attr(&self, attr: SetAttr, fs: &mut FileSystem) -> Result<Stat> {
        let mut disk_inode = fs.read_inode(self.inode_num);

        if let Some(size) = attr.size {
            if disk_inode.is_dir() {
                return Err(Error::IsADirectory);
            }
            fs.truncate(&mut disk_inode, self.inode_num, size)?;
        }
        if let Some(mode) = attr.mode {
            disk_inode.mode = (disk_inode.mode & !0o7777) | (mode & 0o7777);
        }
        if let Some(uid) = attr.uid {
            disk_inode.uid = uid;
        }
        if let Some(gid) = attr.gid {
            disk_inode.gid = gid;
        }
        if let Some(atime) = attr.atime {
            disk_inode.atime = atime;
        }
        if let Some(mtime) = attr.mtime {
            disk_inode.mtime = mtime;
        }

        fs.write_inode(&disk_inode, self.inode_num);
        Ok(self.stat(fs))
    }

    /// 在当前目录下创建普通文件
    pub fn create_file(
        &self,
        name: &str,
        perm: u32,
        uid: u16,
        gid: u16,
        fs: &mut FileSystem,
    ) -> Result<Self> {
        self.create(name, InodeKind::File, perm, uid, gid, fs)
    }

    /// 在当前目录下创建子目录，其中只有`.`与`..`
    pub fn mkdir(
        &self,
        name: &str,
        perm: u32,
        uid: u16,
        gid: u16,
        fs: &mut FileSystem,
    ) -> Result<Self> {
        self.create(name, InodeKind::Directory, perm, uid, gid, fs)
    }

    /// 删除当前目录下的普通文件
    pub fn unlink(&self, name: &str, fs: &mut FileSystem) -> Result<()> {
        self.remove_child(name, fs, |_, child, _| {
            if child.is_dir() {
                Err(Error::IsADirectory)
            } else {
                Ok(())
            }
        })
    }

    /// 删除当前目录下的空目录
    pub fn rmdir(&self, name: &str, fs: &mut FileSystem) -> Result<()> {
        self.remove_child(name, fs, |fs, child, child_num| {
            if !child.is_dir() {
                Err(Error::NotADirectory)
            } else if !fs.read_dir(child_num)?.is_empty() {
                Err(Error::DirectoryNotEmpty)
            } else {
                Ok(())
            }
        })
    }
}

impl Inode {
    fn create(
        &self,
        name: &str,
        kind: InodeKind,
        perm: u32,
        uid: u16,
        gid: u16,
        fs: &mut FileSystem,
    ) -> Result<Self> {
        check_name(name)?;
        DirEntry::new(name, 0)?;

        let mut parent = fs.read_inode(self.inode_num);
        let mut dir = fs.read_dir(self.inode_num)?;
        if dir.find_entry(name).is_ok() {
            return Err(Error::AlreadyExists);
        }

        let inode_num = fs.alloc_inode()?;
        let mut child = DiskInode::new(kind, perm, uid, gid);
        fs.write_inode(&child, inode_num);

        let linked = (|| {
            if kind == InodeKind::Directory {
                fs.write_dir(&mut child, inode_num, &Dir::new(inode_num, self.inode_num))?;
            }
            dir.add_entry(name, inode_num)?;
            fs.write_dir(&mut parent, self.inode_num, &dir)
        })();

        if let Err(err) = linked {
            fs.free_inode_and_blocks(inode_num);
            return Err(err);
        }

        debug!("created {kind:?} {name:?} as inode {inode_num} in {}", self.inode_num);
        Ok(Self::new(inode_num))
    }

    /// 先摘除目录项，再回收 inode 与其数据块
    fn remove_child(
        &self,
        name: &str,
        fs: &mut FileSystem,
        check: impl FnOnce(&FileSystem, &DiskInode, INodeNum) -> Result<()>,
    ) -> Result<()> {
        if name == "." || name == ".." {
            return Err(Error::InvalidPath);
        }

        let mut parent = fs.read_inode(self.inode_num);
        let mut dir = fs.read_dir(self.inode_num)?;
        let child_num = dir.find_entry(name)?.inode_num;
        check(fs, &fs.read_inode(child_num), child_num)?;

        dir.remove_entry(name)?;
        fs.write_dir(&mut parent, self.inode_num, &dir)?;
        fs.free_inode_and_blocks(child_num);

        debug!("removed {name:?} (inode {child_num}) from {}", self.inode_num);
        Ok(())
    }
}

/// 文件名不能为空，也不能含有`/`或 NUL
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(Error::InvalidPath);
    }
    Ok(())
}

fn entry_type(disk_inode: &DiskInode) -> DirEntryType {
    if disk_inode.is_dir() {
        DirEntryType::Directory
    } else {
        DirEntryType::Regular
    }
}

/* 按路径操作，路径均为绝对路径 */

impl FileSystem {
    pub fn get_attributes(&self, path: &str) -> Result<Stat> {
        Ok(Inode::new(self.lookup_path(path)?).stat(self))
    }

    /// 目录下所有项的名字，含`.`与`..`
    pub fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.read_dir(self.lookup_path(path)?)?;
        Ok(dir.entries().iter().map(|entry| entry.name.clone()).collect())
    }

    /// 打开普通文件
    pub fn open_file(&self, path: &str) -> Result<Inode> {
        let inode = Inode::new(self.lookup_path(path)?);
        if inode.is_dir(self) {
            return Err(Error::IsADirectory);
        }
        Ok(inode)
    }

    pub fn create_file(&mut self, path: &str, perm: u32, uid: u16, gid: u16) -> Result<Inode> {
        let (parent, name) = self.parent_of(path)?;
        parent.create_file(name, perm, uid, gid, self)
    }

    pub fn mkdir(&mut self, path: &str, perm: u32, uid: u16, gid: u16) -> Result<Inode> {
        let (parent, name) = self.parent_of(path)?;
        parent.mkdir(name, perm, uid, gid, self)
    }

    pub fn read(&self, path: &str, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.open_file(path)?.read_at(offset, len, self)
    }

    pub fn write(&mut self, path: &str, offset: usize, data: &[u8]) -> Result<usize> {
        self.open_file(path)?.write_at(offset, data, self)
    }

    /// 修改属性；设置大小即截断或扩展普通文件
    pub fn set_attributes(&mut self, path: &str, attr: SetAttr) -> Result<Stat> {
        Inode::new(self.lookup_path(path)?).set_attr(attr, self)
    }

    /// 删除普通文件
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.parent_of(path)?;
        parent.unlink(name, self)
    }

    /// 删除空目录
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.parent_of(path)?;
        parent.rmdir(name, self)
    }

    /// 父目录与文件名，根目录没有父目录
    fn parent_of<'p>(&self, path: &'p str) -> Result<(Inode, &'p str)> {
        let (parent, name) = path.parent_file().ok_or(Error::InvalidPath)?;
        let parent = Inode::new(self.lookup_path(parent)?);
        Ok((parent, name))
    }
}
