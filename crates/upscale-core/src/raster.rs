use serde::{Deserialize, Serialize};

/// Georeferencing of a north-up raster grid.
/// Row 0 is the northern edge (GeoTIFF storage order); pixel sizes are positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    /// X coordinate of the top-left corner of cell (0, 0).
    pub origin_x: f64,
    /// Y coordinate of the top-left corner of cell (0, 0).
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    /// EPSG code of the coordinate reference system, when known.
    pub epsg: Option<u16>,
}

/// Bounding box of a grid in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl GridSpec {
    pub fn new(
        width: usize,
        height: usize,
        origin_x: f64,
        origin_y: f64,
        pixel_width: f64,
        pixel_height: f64,
    ) -> Self {
        Self {
            width,
            height,
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            epsg: None,
        }
    }

    pub fn with_epsg(mut self, epsg: u16) -> Self {
        self.epsg = Some(epsg);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map coordinate of the centre of cell `(row, col)`.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// The `(row, col)` of the cell containing `(x, y)`, or None outside the grid.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let fc = (x - self.origin_x) / self.pixel_width;
        let fr = (self.origin_y - y) / self.pixel_height;
        if !fc.is_finite() || !fr.is_finite() || fc < 0.0 || fr < 0.0 {
            return None;
        }
        let (row, col) = (fr.floor() as usize, fc.floor() as usize);
        (row < self.height && col < self.width).then_some((row, col))
    }

    pub fn extent(&self) -> Extent {
        Extent {
            min_x: self.origin_x,
            max_x: self.origin_x + self.width as f64 * self.pixel_width,
            min_y: self.origin_y - self.height as f64 * self.pixel_height,
            max_y: self.origin_y,
        }
    }

    /// Same shape, origin and resolution, within 1e-6 of a pixel.
    /// The CRS is not compared when either side does not carry one.
    pub fn is_aligned_with(&self, other: &GridSpec) -> bool {
        let tol_x = self.pixel_width.abs() * 1e-6;
        let tol_y = self.pixel_height.abs() * 1e-6;
        let crs_ok = match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        self.width == other.width
            && self.height == other.height
            && (self.origin_x - other.origin_x).abs() <= tol_x
            && (self.origin_y - other.origin_y).abs() <= tol_y
            && (self.pixel_width - other.pixel_width).abs() <= tol_x
            && (self.pixel_height - other.pixel_height).abs() <= tol_y
            && crs_ok
    }
}

/// A single-band raster: row-major f32 cells on a [`GridSpec`].
/// Missing cells are stored as NaN.
#[derive(Debug, Clone)]
pub struct Raster {
    pub grid: GridSpec,
    pub data: Vec<f32>,
}

impl Raster {
    /// Create a raster filled with `fill`.
    pub fn new(grid: GridSpec, fill: f32) -> Self {
        Self {
            data: vec![fill; grid.len()],
            grid,
        }
    }

    /// Create a raster with every cell missing.
    pub fn empty(grid: GridSpec) -> Self {
        Self::new(grid, f32::NAN)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.grid.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.grid.width + col] = val;
    }

    /// Value of the cell containing `(x, y)`.
    /// Returns None outside the grid or when the cell holds no data.
    pub fn sample(&self, x: f64, y: f64) -> Option<f32> {
        let (row, col) = self.grid.cell_at(x, y)?;
        let v = self.get(row, col);
        v.is_finite().then_some(v)
    }

    /// Iterate `(x, y, value)` over every cell holding data, in row-major order.
    pub fn valid_cells(&self) -> impl Iterator<Item = (f64, f64, f32)> + '_ {
        let width = self.grid.width;
        self.data.iter().enumerate().filter(|(_, v)| v.is_finite()).map(move |(i, &v)| {
            let (x, y) = self.grid.cell_center(i / width, i % width);
            (x, y, v)
        })
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }
}
