use core::mem;

use crate::config::DIRENT_MAX_SIZE;
use crate::{Error, INodeNum, Result};

/// 文件系统项的元信息，变长记录：
///
/// ```text
/// +-----+------+----------------------+
/// |ESIZE| INUM | NAME ... <PADDING>   |
/// +-----+------+----------------------+
///    1     2        ESIZE - 3
/// ```
///
/// `ESIZE`是整条记录的字节数（含填充），文件名之后以 0 填充。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub entry_size: u8,
    pub inode_num: INodeNum,
    pub name: String,
}

/// 记录头：`ESIZE`与`INUM`
const HEADER_SIZE: usize = mem::size_of::<u8>() + mem::size_of::<INodeNum>();

impl DirEntry {
    /// 以最小长度创建目录项
    pub fn new(name: &str, inode_num: INodeNum) -> Result<Self> {
        let entry_size = Self::min_entry_size(name);
        if entry_size > DIRENT_MAX_SIZE {
            return Err(Error::NameTooLong);
        }

        Ok(Self {
            entry_size: entry_size as u8,
            inode_num,
            name: name.to_owned(),
        })
    }

    /// 容纳`name`所需的最小记录长度
    #[inline]
    pub fn min_entry_size(name: &str) -> usize {
        HEADER_SIZE + name.len()
    }

    /// 文件名的最大字节数
    #[inline]
    pub const fn max_name_len() -> usize {
        DIRENT_MAX_SIZE - HEADER_SIZE
    }

    /// 记录中超出最小长度的填充字节数
    #[inline]
    pub fn slack(&self) -> usize {
        self.entry_size as usize - Self::min_entry_size(&self.name)
    }

    /// 追加到`out`末尾，长度恰为`entry_size`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.push(self.entry_size);
        out.extend_from_slice(&self.inode_num.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.resize(start + self.entry_size as usize, 0);
    }

    /// 从字节流开头解析一条记录，返回记录及其长度
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let entry_size = *bytes.first().ok_or(Error::Corrupted("truncated dirent"))? as usize;
        if entry_size < HEADER_SIZE || entry_size > bytes.len() {
            return Err(Error::Corrupted("bad dirent size"));
        }

        let inode_num = INodeNum::from_le_bytes([bytes[1], bytes[2]]);
        let name = &bytes[HEADER_SIZE..entry_size];
        let name_len = name.iter().position(|&c| c == 0).unwrap_or(name.len());
        let name = core::str::from_utf8(&name[..name_len])
            .map_err(|_| Error::Corrupted("dirent name is not UTF-8"))?;

        Ok((
            Self {
                entry_size: entry_size as u8,
                inode_num,
                name: name.to_owned(),
            },
            entry_size,
        ))
    }
}
