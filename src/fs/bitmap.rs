use crate::block::{Sector, SECTOR_SIZE};

/// Single-sector allocation bitmap, bit N of byte N/8 tracks entry N.
pub struct Bitmap {
    bits: Sector,
    len: u32,
}

impl Bitmap {
    pub fn new(len: u32) -> Self {
        debug_assert!(len as usize <= SECTOR_SIZE * 8);
        Bitmap {
            bits: [0; SECTOR_SIZE],
            len,
        }
    }

    pub fn from_sector(sector: &Sector, len: u32) -> Self {
        let mut bitmap = Bitmap::new(len);
        bitmap.bits.copy_from_slice(sector);
        bitmap
    }

    pub fn as_sector(&self) -> &Sector {
        &self.bits
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_set(&self, index: u32) -> bool {
        index < self.len && self.bits[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    pub fn set(&mut self, index: u32) {
        if index < self.len {
            self.bits[(index / 8) as usize] |= 1 << (index % 8);
        }
    }

    pub fn clear(&mut self, index: u32) {
        if index < self.len {
            self.bits[(index / 8) as usize] &= !(1 << (index % 8));
        }
    }

    /// First-fit: claims and returns the lowest clear index.
    pub fn alloc(&mut self) -> Option<u32> {
        let index = (0..self.len).find(|&i| !self.is_set(i))?;
        self.set(index);
        Some(index)
    }

    /// Returns false if the index was not allocated.
    pub fn free(&mut self, index: u32) -> bool {
        if !self.is_set(index) {
            return false;
        }
        self.clear(index);
        true
    }

    pub fn count_set(&self) -> u32 {
        (0..self.len).filter(|&i| self.is_set(i)).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_first_fit() {
        let mut map = Bitmap::new(16);
        assert_eq!(map.alloc(), Some(0));
        assert_eq!(map.alloc(), Some(1));
        assert_eq!(map.alloc(), Some(2));
        assert!(map.free(1));
        assert_eq!(map.alloc(), Some(1));
        assert_eq!(map.alloc(), Some(3));
    }

    #[test]
    fn exhaustion_and_double_free() {
        let mut map = Bitmap::new(3);
        for _ in 0..3 {
            assert!(map.alloc().is_some());
        }
        assert_eq!(map.alloc(), None);
        assert!(map.free(2));
        assert!(!map.free(2));
        assert!(!map.free(99));
    }

    #[test]
    fn bits_track_allocations_exactly() {
        let mut map = Bitmap::new(64);
        let mut live = [false; 64];

        // Deterministic mix of allocations and frees.
        let mut seed = 7u32;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            if seed % 3 == 0 {
                let victim = (seed >> 8) % 64;
                assert_eq!(map.free(victim), live[victim as usize]);
                live[victim as usize] = false;
            } else if let Some(index) = map.alloc() {
                assert!(!live[index as usize], "index {} handed out twice", index);
                live[index as usize] = true;
            } else {
                assert!(live.iter().all(|&l| l));
            }

            for i in 0..64 {
                assert_eq!(map.is_set(i), live[i as usize]);
            }
        }
        assert_eq!(map.count_set() as usize, live.iter().filter(|&&l| l).count());
    }

    #[test]
    fn survives_sector_round_trip() {
        let mut map = Bitmap::new(100);
        map.set(0);
        map.set(9);
        map.set(99);
        let copy = Bitmap::from_sector(map.as_sector(), 100);
        assert!(copy.is_set(0) && copy.is_set(9) && copy.is_set(99));
        assert_eq!(copy.count_set(), 3);
    }
}
