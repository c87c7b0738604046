//! Fire versus mechanical clearing classification
//!
//! Once an area flags as cleared, the dNBR and post-event BSI separate
//! burn scars from bulldozed or chained clearing. Fire leaves a charcoal
//! signature (strong dNBR, post NBR near zero); mechanical clearing
//! exposes bright soil without it.

use ndarray::Array2;
use rayon::prelude::*;
use vigia_core::raster::{Raster, RasterElement};
use vigia_core::{Error, Result};

use crate::imagery::{dnbr, DNBR_LOW_SEVERITY};

/// Post-event NBR below this value indicates a fresh burn scar.
pub const NBR_POST_FIRE_THRESHOLD: f64 = 0.1;

/// Clearing mechanism for an alerted pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClearingType {
    None = 0,
    Fire = 1,
    Mechanical = 2,
    Uncertain = 3,
}

impl ClearingType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Fire),
            2 => Some(Self::Mechanical),
            3 => Some(Self::Uncertain),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fire => "fire",
            Self::Mechanical => "mechanical",
            Self::Uncertain => "uncertain",
        }
    }
}

/// Classify each pixel's clearing mechanism from pre/post NBR and post BSI.
///
/// Codes in the output grid follow [`ClearingType`]. NaN in any input
/// fails every comparison, leaving the pixel at 0.
pub fn classify_fire_vs_mechanical(
    nbr_pre: &Raster<f64>,
    nbr_post: &Raster<f64>,
    bsi_post: &Raster<f64>,
) -> Result<Raster<u8>> {
    nbr_pre.check_shape(nbr_post)?;
    nbr_pre.check_shape(bsi_post)?;

    let d_nbr = dnbr(nbr_pre, nbr_post)?;

    let (rows, cols) = d_nbr.shape();
    let nd_post = nbr_post.nodata();
    let nd_bsi = bsi_post.nodata();

    let codes: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_codes = vec![0u8; cols];
            for col in 0..cols {
                let dn = unsafe { d_nbr.get_unchecked(row, col) };
                let post = unsafe { nbr_post.get_unchecked(row, col) };
                let bsi = unsafe { bsi_post.get_unchecked(row, col) };

                let post_valid = !post.is_nodata(nd_post);
                let bsi_valid = !bsi.is_nodata(nd_bsi);

                let fire = dn > DNBR_LOW_SEVERITY && post_valid && post < NBR_POST_FIRE_THRESHOLD;
                let mechanical = bsi_valid && bsi > 0.1 && !fire && dn > 0.05;

                row_codes[col] = if fire {
                    ClearingType::Fire as u8
                } else if mechanical {
                    ClearingType::Mechanical as u8
                } else if dn > 0.1 {
                    ClearingType::Uncertain as u8
                } else {
                    ClearingType::None as u8
                };
            }
            row_codes
        })
        .collect();

    let mut output = d_nbr.with_same_meta::<u8>(rows, cols);
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), codes).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(3, 3, value);
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_fire_signature() {
        // dNBR = 0.55, post NBR 0.05: burn scar
        let result =
            classify_fire_vs_mechanical(&raster(0.6), &raster(0.05), &raster(0.0)).unwrap();
        assert_eq!(result.get(1, 1).unwrap(), ClearingType::Fire as u8);
    }

    #[test]
    fn test_mechanical_signature() {
        // dNBR = 0.2 (no burn severity), post NBR 0.3, bright soil
        let result =
            classify_fire_vs_mechanical(&raster(0.5), &raster(0.3), &raster(0.4)).unwrap();
        assert_eq!(result.get(1, 1).unwrap(), ClearingType::Mechanical as u8);
    }

    #[test]
    fn test_uncertain_change() {
        // dNBR = 0.15: change, but neither signature
        let result =
            classify_fire_vs_mechanical(&raster(0.5), &raster(0.35), &raster(0.0)).unwrap();
        assert_eq!(result.get(1, 1).unwrap(), ClearingType::Uncertain as u8);
    }

    #[test]
    fn test_no_change() {
        let result =
            classify_fire_vs_mechanical(&raster(0.5), &raster(0.48), &raster(0.0)).unwrap();
        assert_eq!(result.get(1, 1).unwrap(), ClearingType::None as u8);
    }

    #[test]
    fn test_fire_takes_priority_over_mechanical() {
        // Both burn signature and bright soil: fire wins
        let result =
            classify_fire_vs_mechanical(&raster(0.6), &raster(0.05), &raster(0.4)).unwrap();
        assert_eq!(result.get(1, 1).unwrap(), ClearingType::Fire as u8);
    }

    #[test]
    fn test_nan_pixel_is_none() {
        let mut pre = raster(0.6);
        pre.set(0, 0, f64::NAN).unwrap();
        let result = classify_fire_vs_mechanical(&pre, &raster(0.05), &raster(0.4)).unwrap();
        assert_eq!(result.get(0, 0).unwrap(), ClearingType::None as u8);
    }

    #[test]
    fn test_labels_roundtrip() {
        for code in 0..=3 {
            let ct = ClearingType::from_code(code).unwrap();
            assert_eq!(ct as u8, code);
        }
        assert!(ClearingType::from_code(4).is_none());
        assert_eq!(ClearingType::Fire.label(), "fire");
    }
}
