//! fsfs 的宿主端：把 FUSE 请求翻译为 [`fsfs::Inode`] 上的操作，
//! 以及把宿主目录打包进映像。
//!
//! FUSE 的根节点编号为 1，而 fsfs 的根 inode 为 0，两者相差 1。


use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fsfs::config::BLOCK_SIZE;
use fsfs::{FileSystem, INodeNum, Inode, SetAttr, ROOT_INODE_NUM};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use libc::c_int;
use log::{debug, error, info};
use vfs::{DirEntryType, Stat};

const TTL: Duration = Duration::from_secs(1);

pub struct FsfsFuse {
    fs: FileSystem,
    /// 卸载时写回的映像文件
    image: PathBuf,
}

impl FsfsFuse {
    pub fn new(fs: FileSystem, image: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            image: image.into(),
        }
    }

    /// 映像存在则载入，否则新建一个属于`uid:gid`的空文件系统
    pub fn open_or_create(image: impl Into<PathBuf>, uid: u16, gid: u16) -> vfs::Result<Self> {
        let image = image.into();
        let fs = if image.exists() {
            FileSystem::open(&image)?
        } else {
            info!("{} not found, creating a new file system", image.display());
            FileSystem::create(uid, gid)?
        };

        Ok(Self::new(fs, image))
    }

    #[inline]
    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    #[inline]
    pub fn fs_mut(&mut self) -> &mut FileSystem {
        &mut self.fs
    }

    pub fn save(&self) -> vfs::Result<()> {
        self.fs.save(&self.image)
    }

    fn attr(&self, inode: Inode) -> FileAttr {
        file_attr(&inode.stat(&self.fs))
    }

    /// FUSE 节点号换算为 inode 句柄，未分配的编号视为不存在
    fn inode(&self, ino: u64) -> Result<Inode, c_int> {
        ino.checked_sub(1)
            .and_then(|num| INodeNum::try_from(num).ok())
            .filter(|&num| self.fs.is_inode_allocated(num))
            .map(Inode::new)
            .ok_or(libc::ENOENT)
    }

    fn lookup_inner(&self, parent: u64, name: &OsStr) -> Result<FileAttr, c_int> {
        let child = self.inode(parent)?.find(name_str(name)?, &self.fs).map_err(errno)?;
        Ok(self.attr(child))
    }

    fn setattr_inner(&mut self, ino: u64, attr: SetAttr) -> Result<FileAttr, c_int> {
        let inode = self.inode(ino)?;
        let stat = inode.set_attr(attr, &mut self.fs).map_err(errno)?;
        Ok(file_attr(&stat))
    }

    fn create_inner(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        dir: bool,
    ) -> Result<FileAttr, c_int> {
        let parent = self.inode(parent)?;
        let name = name_str(name)?;
        let (uid, gid) = owner(req)?;
        let perm = mode & !umask & 0o7777;

        let child = if dir {
            parent.mkdir(name, perm, uid, gid, &mut self.fs)
        } else {
            parent.create_file(name, perm, uid, gid, &mut self.fs)
        }
        .map_err(errno)?;

        Ok(self.attr(child))
    }

    fn read_inner(&self, ino: u64, offset: i64, size: u32) -> Result<Vec<u8>, c_int> {
        let offset = usize::try_from(offset).map_err(|_| libc::EINVAL)?;
        self.inode(ino)?
            .read_at(offset, size as usize, &self.fs)
            .map_err(errno)
    }

    fn write_inner(&mut self, ino: u64, offset: i64, data: &[u8]) -> Result<usize, c_int> {
        let offset = usize::try_from(offset).map_err(|_| libc::EINVAL)?;
        self.inode(ino)?
            .write_some(offset, data, &mut self.fs)
            .map_err(errno)
    }
}

impl Filesystem for FsfsFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        let sb = self.fs.super_block();
        info!(
            "mounted {}: {} inodes, {} blocks in use",
            self.image.display(),
            sb.used_inodes,
            sb.used_blocks
        );
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(err) = self.save() {
            error!("failed to save {}: {err}", self.image.display());
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_inner(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.inode(ino) {
            Ok(inode) => reply.attr(&TTL, &self.attr(inode)),
            Err(e) => reply.error(e),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let attr = (|| -> Result<SetAttr, c_int> {
            Ok(SetAttr {
                mode,
                uid: uid.map(u16::try_from).transpose().map_err(|_| libc::EINVAL)?,
                gid: gid.map(u16::try_from).transpose().map_err(|_| libc::EINVAL)?,
                size: size.map(u32::try_from).transpose().map_err(|_| libc::EFBIG)?,
                atime: atime.map(unix_secs),
                mtime: mtime.map(unix_secs),
            })
        })();

        match attr.and_then(|attr| self.setattr_inner(ino, attr)) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        match self.create_inner(req, parent, name, mode, umask, true) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.inode(parent).and_then(|parent| {
            parent
                .unlink(name_str(name)?, &mut self.fs)
                .map_err(errno)
        });

        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.inode(parent).and_then(|parent| {
            parent
                .rmdir(name_str(name)?, &mut self.fs)
                .map_err(errno)
        });

        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.inode(ino) {
            Ok(inode) if inode.is_dir(&self.fs) => reply.error(libc::EISDIR),
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_inner(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.write_inner(ino, offset, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.save() {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self
            .inode(ino)
            .and_then(|inode| inode.read_dir(&self.fs).map_err(errno))
        {
            Ok(entries) => entries,
            Err(e) => return reply.error(e),
        };

        // 偏移量是下一项的序号
        for (i, entry) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(
                entry.inode + 1,
                (i + 1) as i64,
                file_type(entry.ty),
                &entry.name,
            ) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stat = self.fs.mount_stats();
        reply.statfs(
            stat.blocks,
            stat.free_blocks,
            stat.free_blocks,
            stat.files,
            stat.free_files,
            stat.block_size,
            stat.name_max,
            stat.block_size,
        );
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.create_inner(req, parent, name, mode, umask, false) {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(e) => reply.error(e),
        }
    }
}

/// 把宿主目录`source`下的所有普通文件复制进根目录，返回复制的文件数
pub fn pack_dir(source: &Path, fs: &mut FileSystem, uid: u16, gid: u16) -> vfs::Result<usize> {
    let mut packed = 0;

    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            debug!("skip {}", entry.path().display());
            continue;
        }

        let name = entry.file_name();
        let name = name.to_str().ok_or(vfs::Error::InvalidPath)?;
        let data = std::fs::read(entry.path())?;

        let file = Inode::new(ROOT_INODE_NUM).create_file(name, 0o644, uid, gid, fs)?;
        file.write_at(0, &data, fs)?;
        info!("packed {name:?}, {} bytes", data.len());
        packed += 1;
    }

    Ok(packed)
}

fn errno(err: vfs::Error) -> c_int {
    debug!("request failed: {err}");
    err.errno()
}

fn name_str(name: &OsStr) -> Result<&str, c_int> {
    name.to_str().ok_or(libc::EINVAL)
}

/// 请求者的`uid`与`gid`，需能放进 16 位
fn owner(req: &Request<'_>) -> Result<(u16, u16), c_int> {
    owner_ids(req.uid(), req.gid()).ok_or(libc::EINVAL)
}

/// 宿主的`uid`与`gid`，inode 只存 16 位，放不下时为`None`
pub fn owner_ids(uid: u32, gid: u32) -> Option<(u16, u16)> {
    Some((u16::try_from(uid).ok()?, u16::try_from(gid).ok()?))
}

fn unix_secs(time: TimeOrNow) -> u32 {
    let time = match time {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    };
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}

fn file_type(ty: DirEntryType) -> FileType {
    match ty {
        DirEntryType::Directory => FileType::Directory,
        DirEntryType::Regular => FileType::RegularFile,
    }
}

pub fn file_attr(stat: &Stat) -> FileAttr {
    let atime = UNIX_EPOCH + Duration::from_secs(stat.atime as u64);
    let mtime = UNIX_EPOCH + Duration::from_secs(stat.mtime as u64);

    FileAttr {
        ino: stat.inode + 1,
        size: stat.size,
        blocks: stat.blocks * (BLOCK_SIZE / 512) as u64,
        atime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: file_type(stat.kind),
        perm: stat.perm(),
        nlink: match stat.kind {
            DirEntryType::Directory => 2,
            DirEntryType::Regular => 1,
        },
        uid: stat.uid as u32,
        gid: stat.gid as u32,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}
