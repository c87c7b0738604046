//! Index and sensor dispatch
//!
//! Maps (index, sensor) pairs to the physical bands each formula needs and
//! computes indices from a scene's band set. Sensors differ in which band
//! plays the NIR role: Sentinel-2 has both a broad NIR (B8, 10 m) used for
//! greenness indices and a narrow NIR (B8A, 20 m) used for the
//! moisture-sensitive indices; Landsat and HLS only provide the narrow one.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use vigia_core::raster::Raster;
use vigia_core::{Error, Result};

use super::indices;

/// Supported spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKind {
    /// Normalized Difference Vegetation Index
    Ndvi,
    /// Two-band Enhanced Vegetation Index
    Evi2,
    /// Normalized Difference Moisture Index
    Ndmi,
    /// Normalized Burn Ratio
    Nbr,
    /// Soil-Adjusted Vegetation Index
    Savi,
    /// Bare Soil Index
    Bsi,
}

impl IndexKind {
    /// All indices the engine can compute
    pub const ALL: [IndexKind; 6] = [
        IndexKind::Ndvi,
        IndexKind::Evi2,
        IndexKind::Ndmi,
        IndexKind::Nbr,
        IndexKind::Savi,
        IndexKind::Bsi,
    ];

    /// Short lowercase name used in filenames and database keys
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Ndvi => "ndvi",
            IndexKind::Evi2 => "evi2",
            IndexKind::Ndmi => "ndmi",
            IndexKind::Nbr => "nbr",
            IndexKind::Savi => "savi",
            IndexKind::Bsi => "bsi",
        }
    }

    /// Whether this index belongs to the moisture family (NDMI, NBR) used
    /// for multi-index confirmation of clearing
    pub fn is_moisture_family(&self) -> bool {
        matches!(self, IndexKind::Ndmi | IndexKind::Nbr)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ndvi" => Ok(IndexKind::Ndvi),
            "evi2" => Ok(IndexKind::Evi2),
            "ndmi" => Ok(IndexKind::Ndmi),
            "nbr" => Ok(IndexKind::Nbr),
            "savi" => Ok(IndexKind::Savi),
            "bsi" => Ok(IndexKind::Bsi),
            other => Err(Error::UnknownIndex(other.to_string())),
        }
    }
}

/// Supported sensor platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Sentinel2,
    Landsat,
    Hls,
}

impl Sensor {
    pub fn name(&self) -> &'static str {
        match self {
            Sensor::Sentinel2 => "sentinel2",
            Sensor::Landsat => "landsat",
            Sensor::Hls => "hls",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sensor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sentinel2" | "sentinel-2" | "s2" => Ok(Sensor::Sentinel2),
            "landsat" => Ok(Sensor::Landsat),
            "hls" => Ok(Sensor::Hls),
            other => Err(Error::UnknownSensor(other.to_string())),
        }
    }
}

/// Logical band names, harmonized across sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Blue,
    Green,
    Red,
    /// Broad NIR (Sentinel-2 B8)
    Nir,
    /// Narrow NIR (Sentinel-2 B8A, Landsat B5)
    Nir08,
    /// Shortwave infrared ~1.6 µm
    Swir16,
    /// Shortwave infrared ~2.2 µm
    Swir22,
}

impl Band {
    pub fn name(&self) -> &'static str {
        match self {
            Band::Blue => "blue",
            Band::Green => "green",
            Band::Red => "red",
            Band::Nir => "nir",
            Band::Nir08 => "nir08",
            Band::Swir16 => "swir16",
            Band::Swir22 => "swir22",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The NIR band a given sensor supplies for greenness indices.
///
/// Landsat and HLS have no broad NIR; the narrow band substitutes.
fn greenness_nir(sensor: Sensor) -> Band {
    match sensor {
        Sensor::Sentinel2 => Band::Nir,
        Sensor::Landsat | Sensor::Hls => Band::Nir08,
    }
}

/// Bands required to compute an index on a given sensor
pub fn required_bands(kind: IndexKind, sensor: Sensor) -> Vec<Band> {
    let nir = greenness_nir(sensor);
    match kind {
        IndexKind::Ndvi | IndexKind::Evi2 | IndexKind::Savi => vec![nir, Band::Red],
        IndexKind::Ndmi => vec![Band::Nir08, Band::Swir16],
        IndexKind::Nbr => vec![Band::Nir08, Band::Swir22],
        IndexKind::Bsi => vec![Band::Swir16, Band::Red, nir, Band::Blue],
    }
}

/// A set of co-registered band grids from one scene.
///
/// Delivered by the acquisition/masking collaborator with invalid pixels
/// already set to NaN.
#[derive(Debug, Clone)]
pub struct BandSet {
    sensor: Sensor,
    bands: HashMap<Band, Raster<f64>>,
}

impl BandSet {
    pub fn new(sensor: Sensor) -> Self {
        Self {
            sensor,
            bands: HashMap::new(),
        }
    }

    pub fn sensor(&self) -> Sensor {
        self.sensor
    }

    /// Insert a band grid, rejecting shape mismatches against bands
    /// already present
    pub fn insert(&mut self, band: Band, raster: Raster<f64>) -> Result<()> {
        if let Some(existing) = self.bands.values().next() {
            existing.check_shape(&raster)?;
        }
        self.bands.insert(band, raster);
        Ok(())
    }

    pub fn get(&self, band: Band) -> Option<&Raster<f64>> {
        self.bands.get(&band)
    }

    /// Fetch a band required by `index`, with a configuration error when
    /// the scene does not carry it
    fn require(&self, band: Band, index: IndexKind) -> Result<&Raster<f64>> {
        self.bands.get(&band).ok_or_else(|| Error::MissingBand {
            band: band.name().to_string(),
            index: index.name().to_string(),
        })
    }

    /// Compute one index from this scene's bands.
    ///
    /// A scene missing a required band is a hard error, never a silent
    /// NaN fill.
    pub fn compute_index(&self, kind: IndexKind) -> Result<Raster<f64>> {
        let nir = greenness_nir(self.sensor);
        match kind {
            IndexKind::Ndvi => indices::ndvi(
                self.require(nir, kind)?,
                self.require(Band::Red, kind)?,
            ),
            IndexKind::Evi2 => indices::evi2(
                self.require(nir, kind)?,
                self.require(Band::Red, kind)?,
            ),
            IndexKind::Ndmi => indices::ndmi(
                self.require(Band::Nir08, kind)?,
                self.require(Band::Swir16, kind)?,
            ),
            IndexKind::Nbr => indices::nbr(
                self.require(Band::Nir08, kind)?,
                self.require(Band::Swir22, kind)?,
            ),
            IndexKind::Savi => indices::savi(
                self.require(nir, kind)?,
                self.require(Band::Red, kind)?,
                indices::SaviParams::default(),
            ),
            IndexKind::Bsi => indices::bsi(
                self.require(Band::Swir16, kind)?,
                self.require(Band::Red, kind)?,
                self.require(nir, kind)?,
                self.require(Band::Blue, kind)?,
            ),
        }
    }

    /// Compute several indices, keyed by kind
    pub fn compute_indices(&self, kinds: &[IndexKind]) -> Result<HashMap<IndexKind, Raster<f64>>> {
        let mut out = HashMap::new();
        for &kind in kinds {
            out.insert(kind, self.compute_index(kind)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(value: f64) -> Raster<f64> {
        Raster::filled(4, 4, value)
    }

    #[test]
    fn test_index_from_str() {
        assert_eq!("ndmi".parse::<IndexKind>().unwrap(), IndexKind::Ndmi);
        assert_eq!("NBR".parse::<IndexKind>().unwrap(), IndexKind::Nbr);
        assert!(matches!(
            "ndfi".parse::<IndexKind>(),
            Err(Error::UnknownIndex(_))
        ));
    }

    #[test]
    fn test_sensor_from_str() {
        assert_eq!("sentinel2".parse::<Sensor>().unwrap(), Sensor::Sentinel2);
        assert!(matches!(
            "modis".parse::<Sensor>(),
            Err(Error::UnknownSensor(_))
        ));
    }

    #[test]
    fn test_landsat_substitutes_narrow_nir() {
        let s2 = required_bands(IndexKind::Ndvi, Sensor::Sentinel2);
        let landsat = required_bands(IndexKind::Ndvi, Sensor::Landsat);
        assert!(s2.contains(&Band::Nir));
        assert!(landsat.contains(&Band::Nir08));
    }

    #[test]
    fn test_compute_index_via_dispatch() {
        let mut scene = BandSet::new(Sensor::Sentinel2);
        scene.insert(Band::Nir08, band(0.4)).unwrap();
        scene.insert(Band::Swir16, band(0.2)).unwrap();

        let ndmi = scene.compute_index(IndexKind::Ndmi).unwrap();
        let v = ndmi.get(1, 1).unwrap();
        assert!((v - 1.0 / 3.0).abs() < 1e-12, "got {}", v);
    }

    #[test]
    fn test_missing_band_is_an_error() {
        let mut scene = BandSet::new(Sensor::Sentinel2);
        scene.insert(Band::Nir08, band(0.4)).unwrap();

        let err = scene.compute_index(IndexKind::Ndmi).unwrap_err();
        assert!(matches!(err, Error::MissingBand { .. }));
    }

    #[test]
    fn test_insert_rejects_shape_mismatch() {
        let mut scene = BandSet::new(Sensor::Hls);
        scene.insert(Band::Red, Raster::filled(4, 4, 0.1)).unwrap();
        assert!(scene.insert(Band::Nir08, Raster::filled(4, 5, 0.3)).is_err());
    }
}
