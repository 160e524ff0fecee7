//! Single-band GeoTIFF reading and Float32 GeoTIFF writing on top of the
//! pure-Rust `tiff` codec.
//!
//! Only the GeoTIFF tags needed to place a north-up grid are handled:
//! ModelPixelScale + ModelTiepoint (or an unrotated ModelTransformation),
//! the GeoKey directory for the EPSG code, and GDAL's nodata tag.

use std::fs;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::TiffResult;

use crate::error::{Result, UpscaleError};
use crate::raster::{GridSpec, Raster};

// ── GeoKey ids (GeoTIFF 1.0 §6.2) ────────────────────────────────────────────

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

// ── Reading ──────────────────────────────────────────────────────────────────

/// Read a single-band GeoTIFF into a [`Raster`].
/// Cells equal to the GDAL nodata value come back as NaN.
pub fn read_geotiff(path: &Path) -> Result<Raster> {
    let file = fs::File::open(path).map_err(|e| UpscaleError::io(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| UpscaleError::tiff(path, e))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions().map_err(|e| UpscaleError::tiff(path, e))?;
    let grid = read_grid(&mut decoder, width as usize, height as usize)
        .map_err(|e| UpscaleError::tiff(path, e))?
        .ok_or_else(|| UpscaleError::MissingGeoreference { path: path.to_path_buf() })?;
    let nodata = read_nodata(&mut decoder).map_err(|e| UpscaleError::tiff(path, e))?;

    let image = decoder.read_image().map_err(|e| UpscaleError::tiff(path, e))?;
    let mut data = samples_to_f32(image).ok_or_else(|| UpscaleError::UnsupportedRaster {
        path: path.to_path_buf(),
        reason: "unsupported sample format".into(),
    })?;
    if data.len() != grid.len() {
        return Err(UpscaleError::UnsupportedRaster {
            path: path.to_path_buf(),
            reason: format!(
                "expected one band of {}×{} samples, decoded {}",
                width,
                height,
                data.len()
            ),
        });
    }

    if let Some(nd) = nodata.filter(|nd| nd.is_finite()) {
        let nd = nd as f32;
        for v in data.iter_mut().filter(|v| **v == nd) {
            *v = f32::NAN;
        }
    }

    Ok(Raster { grid, data })
}

fn samples_to_f32(image: DecodingResult) -> Option<Vec<f32>> {
    #[allow(unreachable_patterns)]
    let data = match image {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|s| s as f32).collect(),
        _ => return None,
    };
    Some(data)
}

fn find_f64s<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> TiffResult<Option<Vec<f64>>> {
    decoder.find_tag(tag)?.map(|v| v.into_f64_vec()).transpose()
}

/// Build the grid from the model tags. Ok(None) when the file carries none.
fn read_grid<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    width: usize,
    height: usize,
) -> TiffResult<Option<GridSpec>> {
    let scale = find_f64s(decoder, Tag::ModelPixelScaleTag)?;
    let tiepoint = find_f64s(decoder, Tag::ModelTiepointTag)?;
    let transform = find_f64s(decoder, Tag::ModelTransformationTag)?;

    let mut grid = match (scale, tiepoint, transform) {
        (Some(s), Some(t), _) if s.len() >= 2 && t.len() >= 6 => {
            // Tiepoint maps raster (i, j) to model (x, y).
            let (sx, sy) = (s[0], s[1]);
            GridSpec::new(width, height, t[3] - t[0] * sx, t[4] + t[1] * sy, sx, sy)
        }
        (_, _, Some(m)) if m.len() >= 16 && m[1] == 0.0 && m[4] == 0.0 => {
            GridSpec::new(width, height, m[3], m[7], m[0], -m[5])
        }
        _ => return Ok(None),
    };

    let keys = read_geo_keys(decoder)?;
    if lookup_key(&keys, GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        // Tiepoint refers to the centre of the first cell.
        grid.origin_x -= grid.pixel_width / 2.0;
        grid.origin_y += grid.pixel_height / 2.0;
    }
    grid.epsg = lookup_key(&keys, PROJECTED_CS_TYPE)
        .or_else(|| lookup_key(&keys, GEOGRAPHIC_TYPE))
        .filter(|&code| code != 0 && code != USER_DEFINED);
    Ok(Some(grid))
}

fn read_geo_keys<R: Read + Seek>(decoder: &mut Decoder<R>) -> TiffResult<Vec<u16>> {
    Ok(decoder
        .find_tag(Tag::GeoKeyDirectoryTag)?
        .map(|v| v.into_u16_vec())
        .transpose()?
        .unwrap_or_default())
}

/// Inline SHORT value of `key` in a GeoKey directory.
fn lookup_key(directory: &[u16], key: u16) -> Option<u16> {
    let n = usize::from(*directory.get(3)?);
    directory
        .get(4..)?
        .chunks_exact(4)
        .take(n)
        .find(|entry| entry[0] == key && entry[1] == 0)
        .map(|entry| entry[3])
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> TiffResult<Option<f64>> {
    let Some(value) = decoder.find_tag(Tag::GdalNodata)? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    Ok(text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok())
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// EPSG codes in the 4000 range are geographic CRSs; everything else is
/// written as a projected CRS.
fn is_geographic(epsg: u16) -> bool {
    (4000..5000).contains(&epsg)
}

fn geo_key_directory(epsg: Option<u16>) -> Vec<u16> {
    let model_type = match epsg {
        Some(code) if is_geographic(code) => MODEL_TYPE_GEOGRAPHIC,
        _ => MODEL_TYPE_PROJECTED,
    };
    let mut entries = vec![
        [GT_MODEL_TYPE, 0, 1, model_type],
        [GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA],
    ];
    if let Some(code) = epsg {
        let key = if is_geographic(code) { GEOGRAPHIC_TYPE } else { PROJECTED_CS_TYPE };
        entries.push([key, 0, 1, code]);
    }
    let mut dir = vec![1, 1, 0, entries.len() as u16];
    dir.extend(entries.into_iter().flatten());
    dir
}

/// Write `raster` as a single-band Float32 GeoTIFF, replacing any existing
/// file. Missing directories are created. Missing cells are NaN, flagged
/// through the GDAL nodata tag.
pub fn write_geotiff(path: &Path, raster: &Raster) -> Result<()> {
    let buf = encode_geotiff(raster).map_err(|e| UpscaleError::tiff(path, e))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| UpscaleError::io(parent, e))?;
    }
    fs::write(path, buf).map_err(|e| UpscaleError::io(path, e))
}

fn encode_geotiff(raster: &Raster) -> TiffResult<Vec<u8>> {
    let g = &raster.grid;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor)?;
        let mut image =
            encoder.new_image::<colortype::Gray32Float>(g.width as u32, g.height as u32)?;
        let dir = image.encoder();
        dir.write_tag(Tag::ModelPixelScaleTag, &[g.pixel_width, g.pixel_height, 0.0][..])?;
        dir.write_tag(
            Tag::ModelTiepointTag,
            &[0.0, 0.0, 0.0, g.origin_x, g.origin_y, 0.0][..],
        )?;
        dir.write_tag(Tag::GeoKeyDirectoryTag, &geo_key_directory(g.epsg)[..])?;
        dir.write_tag(Tag::GdalNodata, "nan")?;
        image.write_data(&raster.data)?;
    }
    Ok(cursor.into_inner())
}
