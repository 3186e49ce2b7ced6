use crate::config::SUPER_BLOCK_SIZE;

/// 超级块：记录已用 inode 与已用数据块的个数。
///
/// 计数值始终等于对应位图中置位的个数，是位图的冗余视图。
/// 磁盘上先存已用块数，再存已用 inode 数。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub used_blocks: u16,
    pub used_inodes: u16,
}

impl SuperBlock {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            used_blocks: u16::from_le_bytes([bytes[0], bytes[1]]),
            used_inodes: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; SUPER_BLOCK_SIZE] {
        let mut bytes = [0; SUPER_BLOCK_SIZE];
        bytes[..2].copy_from_slice(&self.used_blocks.to_le_bytes());
        bytes[2..].copy_from_slice(&self.used_inodes.to_le_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_counter_comes_first() {
        let sb = SuperBlock {
            used_blocks: 0x0102,
            used_inodes: 0x0304,
        };
        assert_eq!(sb.to_bytes(), [0x02, 0x01, 0x04, 0x03]);
        assert_eq!(SuperBlock::from_bytes(&sb.to_bytes()), sb);
    }
}
