use core::ops::Range;

use crate::{Error, Result};

/// 位图组，按 64 位一组存储、查找
type BitGroup = u64;
const GROUP_BITS: usize = BitGroup::BITS as usize;

/// 位图，记录其指示区域（inode 或数据块）的分配情况。
///
/// 第`i`位置位表示编号为`base + i`的对象已被占用。
/// inode 编号从 0 开始，块编号从 1 开始（0 表示“无块”）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    groups: Vec<BitGroup>,
    /// 可分配的位数
    len: usize,
    /// 第 0 位对应的编号
    base: usize,
}

impl Bitmap {
    pub fn new(len: usize, base: usize) -> Self {
        Self {
            groups: vec![0; len.div_ceil(GROUP_BITS)],
            len,
            base,
        }
    }

    /// 从按字节打包（字节内低位在前）的数据还原位图，`len`之后的位被忽略
    pub fn from_bytes(bytes: &[u8], len: usize, base: usize) -> Self {
        let mut bitmap = Self::new(len, base);

        for (byte_index, &byte) in bytes.iter().take(len.div_ceil(8)).enumerate() {
            bitmap.groups[byte_index / 8] |= (byte as BitGroup) << (byte_index % 8 * 8);
        }

        // 剔除超出容量的位
        if len % GROUP_BITS != 0 {
            if let Some(last) = bitmap.groups.last_mut() {
                *last &= (1 << (len % GROUP_BITS)) - 1;
            }
        }

        bitmap
    }

    /// 打包为字节写入`out`，`out`中超出位图的部分填零
    pub fn write_bytes(&self, out: &mut [u8]) {
        for (byte_index, byte) in out.iter_mut().enumerate() {
            *byte = self.byte(byte_index);
        }
    }

    /// 打包后的第`byte_index`个字节
    #[inline]
    pub fn byte(&self, byte_index: usize) -> u8 {
        self.groups
            .get(byte_index / 8)
            .map_or(0, |&group| (group >> (byte_index % 8 * 8)) as u8)
    }

    /// 编号`id`所在位落在打包数据的第几个字节
    #[inline]
    pub fn byte_index(&self, id: usize) -> usize {
        self.bit_index(id) / 8
    }

    /// 已置位的个数
    pub fn count(&self) -> usize {
        self.groups
            .iter()
            .map(|group| group.count_ones() as usize)
            .sum()
    }

    /// 从`hint`开始寻找空闲编号，到末尾后回绕到开头；
    /// 转一整圈都没有找到则报错。
    pub fn find_free(&self, hint: usize) -> Result<usize> {
        let start = hint
            .checked_sub(self.base)
            .filter(|&index| index < self.len)
            .unwrap_or(0);

        self.first_clear(start..self.len)
            .or_else(|| self.first_clear(0..start))
            .map(|index| index + self.base)
            .ok_or(Error::ResourceExhausted)
    }

    pub fn is_set(&self, id: usize) -> bool {
        let index = self.bit_index(id);
        self.groups[index / GROUP_BITS] & (1 << (index % GROUP_BITS)) != 0
    }

    pub fn set(&mut self, id: usize) {
        debug_assert!(!self.is_set(id), "id {id} is already in use");
        let index = self.bit_index(id);
        self.groups[index / GROUP_BITS] |= 1 << (index % GROUP_BITS);
    }

    pub fn reset(&mut self, id: usize) {
        // 编号一定得有对应的位
        debug_assert!(self.is_set(id), "id {id} is not in use");
        let index = self.bit_index(id);
        self.groups[index / GROUP_BITS] &= !(1 << (index % GROUP_BITS));
    }
}

impl Bitmap {
    #[inline]
    fn bit_index(&self, id: usize) -> usize {
        assert!(
            (self.base..self.base + self.len).contains(&id),
            "id {id} out of bitmap"
        );
        id - self.base
    }

    /// 在位区间内寻找第一个 0 位
    fn first_clear(&self, range: Range<usize>) -> Option<usize> {
        if range.is_empty() {
            return None;
        }

        let first = range.start / GROUP_BITS;
        let last = (range.end - 1) / GROUP_BITS;
        (first..=last).find_map(|group_index| {
            let mut bits = self.groups[group_index];
            // 区间外的位视作已占用
            if group_index == first {
                bits |= (1 << (range.start % GROUP_BITS)) - 1;
            }
            if group_index == last {
                let end = range.end - group_index * GROUP_BITS;
                if end < GROUP_BITS {
                    bits |= !((1 << end) - 1);
                }
            }

            (bits != BitGroup::MAX)
                .then(|| group_index * GROUP_BITS + bits.trailing_ones() as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ids_start_from_one() {
        let mut bitmap = Bitmap::new(100, 1);
        assert_eq!(bitmap.find_free(0).unwrap(), 1);
        bitmap.set(1);
        bitmap.set(2);
        assert_eq!(bitmap.find_free(0).unwrap(), 3);
        assert_eq!(bitmap.count(), 2);
    }

    #[test]
    fn scan_wraps_around_from_hint() {
        let mut bitmap = Bitmap::new(130, 0);
        for id in 60..130 {
            bitmap.set(id);
        }
        assert_eq!(bitmap.find_free(70).unwrap(), 0);
        assert_eq!(bitmap.find_free(5).unwrap(), 5);

        bitmap.set(5);
        assert_eq!(bitmap.find_free(5).unwrap(), 6);
    }

    #[test]
    fn full_bitmap_is_exhausted() {
        let mut bitmap = Bitmap::new(70, 1);
        for id in 1..=70 {
            bitmap.set(id);
        }
        assert!(matches!(bitmap.find_free(33), Err(Error::ResourceExhausted)));

        bitmap.reset(42);
        assert_eq!(bitmap.find_free(50).unwrap(), 42);
        assert_eq!(bitmap.count(), 69);
    }

    #[test]
    fn never_returns_bits_past_len() {
        let mut bitmap = Bitmap::new(3, 0);
        bitmap.set(0);
        bitmap.set(1);
        bitmap.set(2);
        assert!(bitmap.find_free(0).is_err());
    }

    #[test]
    fn bytes_are_lsb_first() {
        let mut bitmap = Bitmap::new(24, 0);
        bitmap.set(0);
        bitmap.set(9);
        bitmap.set(23);

        let mut bytes = [0xFF; 4];
        bitmap.write_bytes(&mut bytes);
        assert_eq!(bytes, [0b0000_0001, 0b0000_0010, 0b1000_0000, 0]);
        assert_eq!(bitmap.byte_index(23), 2);
    }

    #[test]
    fn bytes_round_trip() {
        let pattern: Vec<u8> = (0..200u32).map(|i| (i * 37 % 251) as u8).collect();
        let bitmap = Bitmap::from_bytes(&pattern, pattern.len() * 8, 1);

        let mut bytes = vec![0; pattern.len()];
        bitmap.write_bytes(&mut bytes);
        assert_eq!(bytes, pattern);
        assert_eq!(
            bitmap.count(),
            pattern.iter().map(|b| b.count_ones() as usize).sum::<usize>()
        );
    }

    #[test]
    fn bits_past_len_are_dropped() {
        let bitmap = Bitmap::from_bytes(&[0xFF, 0xFF], 12, 0);
        assert_eq!(bitmap.count(), 12);

        let mut bytes = [0; 2];
        bitmap.write_bytes(&mut bytes);
        assert_eq!(bytes, [0xFF, 0x0F]);
    }
}
