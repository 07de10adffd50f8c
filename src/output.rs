use super::*;

/// Rendered image, tightly packed 8-bit RGB rows, top row first.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        ensure!(width > 0 && height > 0, "Output size must be non-zero");
        Ok(Self {
            width,
            height,
            data: vec![0; 3 * width as usize * height as usize],
        })
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[allow(dead_code)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = 3 * (y as usize * self.width as usize + x as usize);
        let mut rgb = [0; 3];
        rgb.copy_from_slice(&self.data[offset..offset + 3]);
        Some(rgb)
    }

    /// Rows as mutable slices, for filling in parallel.
    pub fn rows_mut(&mut self) -> impl IndexedParallelIterator<Item = (u32, &mut [u8])> + '_ {
        let row_len = 3 * self.width as usize;
        self.data
            .par_chunks_exact_mut(row_len)
            .enumerate()
            .map(|(y, row)| (y as u32, row))
    }
}

//
// Tests
//
