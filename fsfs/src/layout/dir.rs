//! 目录
//!
//! 目录的数据就是一串首尾相接的 [`DirEntry`] 记录，没有分隔符。
//! 新目录项复用第一个填充足够的记录（首次适配），删除的记录则并入前一条作为填充，
//! 因此目录的字节流只会在删除最后一项时变短。

use log::debug;

use super::DirEntry;
use crate::config::DIRENT_MAX_SIZE;
use crate::{Error, INodeNum, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dir {
    entries: Vec<DirEntry>,
}

impl Dir {
    /// 只含`.`与`..`的新目录
    pub fn new(self_num: INodeNum, parent_num: INodeNum) -> Self {
        let entry = |name: &str, inode_num| DirEntry {
            entry_size: DirEntry::min_entry_size(name) as u8,
            inode_num,
            name: name.to_owned(),
        };

        Self {
            entries: vec![entry(".", self_num), entry("..", parent_num)],
        }
    }

    /// 解析目录文件的全部数据
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        while !bytes.is_empty() {
            let (entry, len) = DirEntry::parse(bytes)?;
            entries.push(entry);
            bytes = &bytes[len..];
        }

        Ok(Self { entries })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size());
        for entry in &self.entries {
            entry.write_to(&mut bytes);
        }
        bytes
    }

    /// 目录数据的字节数，目录 inode 的`size`应与之相等
    pub fn size(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.entry_size as usize)
            .sum()
    }

    #[inline]
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// 除了`.`与`..`以外没有其它项
    pub fn is_empty(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.name == "." || entry.name == "..")
    }

    pub fn find_entry(&self, name: &str) -> Result<&DirEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .ok_or(Error::NotFound)
    }

    /// 插入新目录项：找到第一条填充足以容纳新项的记录，
    /// 将其收缩到最小长度，新项紧随其后并接管全部填充；
    /// 找不到就追加到末尾。
    pub fn add_entry(&mut self, name: &str, inode_num: INodeNum) -> Result<()> {
        let mut new_entry = DirEntry::new(name, inode_num)?;
        let needed = new_entry.entry_size as usize;

        match self
            .entries
            .iter()
            .position(|entry| entry.slack() >= needed)
        {
            Some(index) => {
                let host = &mut self.entries[index];
                let slack = host.slack();
                host.entry_size -= slack as u8;
                new_entry.entry_size = slack as u8;
                debug!("dirent {name:?} reuses {slack} bytes after {:?}", host.name);
                self.entries.insert(index + 1, new_entry);
            }
            None => self.entries.push(new_entry),
        }

        Ok(())
    }

    /// 删除目录项：
    /// - 最后一项直接弹出；
    /// - 第一项与最后一项交换后弹出；
    /// - 其余的并入前一项作为填充，若前一项因此超长，则退回交换弹出的做法。
    pub fn remove_entry(&mut self, name: &str) -> Result<DirEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.name == name)
            .ok_or(Error::NotFound)?;
        let last = self.entries.len() - 1;

        let removed = if index == last || index == 0 {
            self.entries.swap_remove(index)
        } else {
            let merged =
                self.entries[index - 1].entry_size as usize + self.entries[index].entry_size as usize;
            if merged > DIRENT_MAX_SIZE {
                self.entries.swap_remove(index)
            } else {
                self.entries[index - 1].entry_size = merged as u8;
                self.entries.remove(index)
            }
        };

        Ok(removed)
    }
}
