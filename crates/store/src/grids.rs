//! Baseline grid persistence
//!
//! Monthly baseline means and standard deviations are f64 grids that must
//! survive between the baseline build and later detection runs. They are
//! stored in a small versioned little-endian format:
//!
//! ```text
//! magic   [u8; 4]   "VGRD"
//! version u16
//! rows    u32
//! cols    u32
//! transform 6 x f64 (origin_x, origin_y, pixel_width, pixel_height,
//!                    row_rotation, col_rotation)
//! epsg    u32       0 when the CRS is unknown
//! payload rows*cols x f64, row-major
//! ```
//!
//! Writes are atomic (temp file + rename).

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use vigia_core::raster::Raster;
use vigia_core::{Crs, GeoTransform};

use crate::error::{Result, StoreError};

const MAGIC: [u8; 4] = *b"VGRD";
const VERSION: u16 = 1;
// magic + version + rows + cols + 6-coefficient transform + epsg
const HEADER_LEN: u64 = 4 + 2 + 4 + 4 + 48 + 4;

/// Directory-backed store of baseline grids, one file per
/// (index, month, statistic).
pub struct BaselineStore {
    dir: PathBuf,
}

/// Which of the two baseline statistics a grid holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineStat {
    Mean,
    Std,
}

impl BaselineStat {
    fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Std => "std",
        }
    }
}

impl BaselineStore {
    /// Create the store, making the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, index: &str, month: u32, stat: BaselineStat) -> PathBuf {
        self.dir
            .join(format!("{index}_month{month:02}_{}.grd", stat.name()))
    }

    /// Persist one baseline grid, replacing any existing file.
    pub fn save(
        &self,
        index: &str,
        month: u32,
        stat: BaselineStat,
        grid: &Raster<f64>,
    ) -> Result<PathBuf> {
        let path = self.path_for(index, month, stat);
        write_grid(&path, grid)?;
        tracing::debug!(path = %path.display(), "baseline grid written");
        Ok(path)
    }

    /// Load one baseline grid.
    ///
    /// An absent file is `NotFound`; a file with a bad magic, version or
    /// truncated payload is `Corrupt`.
    pub fn load(&self, index: &str, month: u32, stat: BaselineStat) -> Result<Raster<f64>> {
        let path = self.path_for(index, month, stat);
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "no {} baseline for {index} month {month}",
                stat.name()
            )));
        }
        read_grid(&path)
    }

    /// Whether a baseline grid exists for this key.
    pub fn exists(&self, index: &str, month: u32, stat: BaselineStat) -> bool {
        self.path_for(index, month, stat).exists()
    }
}

/// Write a grid in the VGRD format, atomically.
pub fn write_grid(path: &Path, grid: &Raster<f64>) -> Result<()> {
    let tmp = path.with_extension("grd.tmp");

    let mut writer = BufWriter::new(File::create(&tmp)?);
    writer.write_all(&MAGIC)?;
    writer.write_u16::<LittleEndian>(VERSION)?;
    writer.write_u32::<LittleEndian>(grid.rows() as u32)?;
    writer.write_u32::<LittleEndian>(grid.cols() as u32)?;

    let t = grid.transform();
    for v in [
        t.origin_x,
        t.origin_y,
        t.pixel_width,
        t.pixel_height,
        t.row_rotation,
        t.col_rotation,
    ] {
        writer.write_f64::<LittleEndian>(v)?;
    }

    let epsg = grid.crs().and_then(|c| c.epsg()).unwrap_or(0);
    writer.write_u32::<LittleEndian>(epsg)?;

    for v in grid.data().iter() {
        writer.write_f64::<LittleEndian>(*v)?;
    }
    writer.flush()?;
    drop(writer);

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a grid in the VGRD format.
pub fn read_grid(path: &Path) -> Result<Raster<f64>> {
    let corrupt = |reason: &str| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    };

    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| corrupt("truncated header"))?;
    if magic != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = reader
        .read_u16::<LittleEndian>()
        .map_err(|_| corrupt("truncated header"))?;
    if version != VERSION {
        return Err(corrupt("unsupported version"));
    }

    let rows = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt("truncated header"))? as usize;
    let cols = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt("truncated header"))? as usize;

    let mut t = [0f64; 6];
    for v in t.iter_mut() {
        *v = reader
            .read_f64::<LittleEndian>()
            .map_err(|_| corrupt("truncated transform"))?;
    }
    let epsg = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt("truncated header"))?;

    // validate the declared shape against the file length before
    // trusting it with an allocation
    let expected_len = rows
        .checked_mul(cols)
        .and_then(|cells| (cells as u64).checked_mul(8))
        .and_then(|payload| payload.checked_add(HEADER_LEN))
        .ok_or_else(|| corrupt("implausible dimensions"))?;
    if file_len != expected_len {
        return Err(corrupt("payload length does not match declared shape"));
    }

    let mut data = vec![0f64; rows * cols];
    for v in data.iter_mut() {
        *v = reader
            .read_f64::<LittleEndian>()
            .map_err(|_| corrupt("truncated payload"))?;
    }

    let mut grid = Raster::from_vec(data, rows, cols)?;
    let mut transform = GeoTransform::new(t[0], t[1], t[2], t[3]);
    transform.row_rotation = t[4];
    transform.col_rotation = t[5];
    grid.set_transform(transform);
    if epsg != 0 {
        grid.set_crs(Some(Crs::from_epsg(epsg)));
    }
    grid.set_nodata(Some(f64::NAN));
    Ok(grid)
}
