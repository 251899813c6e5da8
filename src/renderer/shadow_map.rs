//! Shadow Map Atlas
//!
//! Shadow maps are carved out of square atlas pages with a shelf packer.
//! Lights are served largest-first (the collector sorts them by footprint),
//! which keeps shelf waste low. The allocator is reset every frame; regions
//! are only valid for the frame they were handed out in.

use glam::{IVec2, IVec4, Mat4, Vec3};
use log::{debug, warn};

use crate::errors::{BatchError, Result};

/// A rectangle of one atlas page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMapRegion {
    pub page: u32,
    /// `(left, top, right, bottom)` in texels.
    pub rect: IVec4,
    pub page_size: u32,
}

impl ShadowMapRegion {
    #[must_use]
    pub fn size(&self) -> IVec2 {
        IVec2::new(self.rect.z - self.rect.x, self.rect.w - self.rect.y)
    }

    /// Sub-rectangle of split `index` when the region is tiled with
    /// `split_size` squares in row-major order.
    #[must_use]
    pub fn split(&self, index: usize, split_size: i32) -> Option<ShadowMapRegion> {
        if split_size <= 0 {
            return None;
        }
        let columns = (self.size().x / split_size).max(1) as usize;
        let x = self.rect.x + (index % columns) as i32 * split_size;
        let y = self.rect.y + (index / columns) as i32 * split_size;
        if x + split_size > self.rect.z || y + split_size > self.rect.w {
            return None;
        }
        Some(ShadowMapRegion {
            page: self.page,
            rect: IVec4::new(x, y, x + split_size, y + split_size),
            page_size: self.page_size,
        })
    }

    /// Maps clip space of a split onto this region's texture coordinates.
    #[must_use]
    pub fn uv_transform(&self) -> Mat4 {
        let page = self.page_size.max(1) as f32;
        let size = self.size().as_vec2() / page;
        let offset = IVec2::new(self.rect.x, self.rect.y).as_vec2() / page;
        // NDC y points up, texture v points down
        Mat4::from_translation(Vec3::new(offset.x + size.x * 0.5, offset.y + size.y * 0.5, 0.0))
            * Mat4::from_scale(Vec3::new(size.x * 0.5, -size.y * 0.5, 1.0))
    }
}

#[derive(Debug, Clone)]
struct Shelf {
    y: u32,
    height: u32,
    cursor_x: u32,
}

#[derive(Debug, Clone, Default)]
struct AtlasPage {
    shelves: Vec<Shelf>,
    next_y: u32,
}

impl AtlasPage {
    fn allocate(&mut self, width: u32, height: u32, page_size: u32) -> Option<(u32, u32)> {
        let best = self
            .shelves
            .iter_mut()
            .filter(|s| s.height >= height && page_size - s.cursor_x >= width)
            .min_by_key(|s| s.height - height);
        if let Some(shelf) = best {
            let x = shelf.cursor_x;
            shelf.cursor_x += width;
            return Some((x, shelf.y));
        }

        if page_size - self.next_y < height {
            return None;
        }
        let y = self.next_y;
        self.next_y += height;
        self.shelves.push(Shelf {
            y,
            height,
            cursor_x: width,
        });
        Some((0, y))
    }
}

/// Per-frame shadow atlas allocator.
#[derive(Debug)]
pub struct ShadowMapAllocator {
    page_size: u32,
    pages: Vec<AtlasPage>,
}

impl ShadowMapAllocator {
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: u32) {
        if page_size != self.page_size {
            debug!("Shadow atlas page size changed to {page_size}");
            self.page_size = page_size;
            self.pages.clear();
        }
    }

    /// Pages used this frame.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Releases every region.
    pub fn reset(&mut self) {
        self.pages.clear();
    }

    pub fn allocate(&mut self, size: IVec2) -> Result<ShadowMapRegion> {
        let page_size = self.page_size;
        if size.x <= 0 || size.y <= 0 || size.x as u32 > page_size || size.y as u32 > page_size {
            return Err(BatchError::ShadowMapTooLarge {
                width: size.x,
                height: size.y,
                page_size,
            });
        }
        let (width, height) = (size.x as u32, size.y as u32);

        let found = self
            .pages
            .iter_mut()
            .enumerate()
            .find_map(|(i, page)| page.allocate(width, height, page_size).map(|pos| (i, pos)));

        let (page, (x, y)) = match found {
            Some(found) => found,
            None => {
                let mut page = AtlasPage::default();
                let Some(pos) = page.allocate(width, height, page_size) else {
                    warn!("Shadow atlas page {page_size} rejected a {width}x{height} region");
                    return Err(BatchError::ShadowMapTooLarge {
                        width: size.x,
                        height: size.y,
                        page_size,
                    });
                };
                self.pages.push(page);
                (self.pages.len() - 1, pos)
            }
        };

        let (x, y) = (x as i32, y as i32);
        Ok(ShadowMapRegion {
            page: page as u32,
            rect: IVec4::new(x, y, x + size.x, y + size.y),
            page_size,
        })
    }
}
