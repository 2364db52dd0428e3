//! NIfTI file I/O
//!
//! Loads 3D and 4D NIfTI-1 volumes (.nii and .nii.gz, gzip auto-detected)
//! into [`Volume`]s and writes volumes back as float32 NIfTI-1 files.
//! Writes are atomic: bytes go to a temporary sibling which is then renamed.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array, IxDyn};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{FieldmapError, Result};
use crate::volume::Volume;

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Get header info for diagnostics
fn get_header_info(bytes: &[u8]) -> String {
    if bytes.len() < HEADER_SIZE {
        return format!("File too small ({} bytes, need at least {})", bytes.len(), HEADER_SIZE);
    }

    // NIfTI-1 header size at offset 0, magic at 344, datatype at 70
    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);

    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

fn parse_object(bytes: &[u8]) -> Result<InMemNiftiObject> {
    if is_gzip(bytes) {
        let decoder = GzDecoder::new(Cursor::new(bytes));
        InMemNiftiObject::from_reader(decoder).map_err(|e| {
            let mut decompressed = Vec::new();
            let mut decoder2 = GzDecoder::new(Cursor::new(bytes));
            let info = if std::io::Read::read_to_end(&mut decoder2, &mut decompressed).is_ok() {
                get_header_info(&decompressed)
            } else {
                "Could not decompress".to_string()
            };
            FieldmapError::Io(format!("Failed to read gzipped NIfTI: {} ({})", e, info))
        })
    } else {
        let info = get_header_info(bytes);
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| FieldmapError::Io(format!("Failed to read NIfTI: {} ({})", e, info)))
    }
}

/// Load a NIfTI volume from bytes
///
/// 3D images give `n_vols == 1`; 4D images keep every frame, stored
/// frame after frame in Fortran order.
pub fn load_nifti(bytes: &[u8]) -> Result<Volume> {
    let obj = parse_object(bytes)?;
    let header = obj.header();

    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(FieldmapError::Io(format!("Expected at least 3D volume, got {}D", ndim)));
    }

    let voxel_size = (
        (header.pixdim[1] as f64).abs(),
        (header.pixdim[2] as f64).abs(),
        (header.pixdim[3] as f64).abs(),
    );
    let affine = get_affine(header);

    let array: Array<f64, IxDyn> = obj.into_volume().into_ndarray()
        .map_err(|e| FieldmapError::Io(format!("Failed to convert to ndarray: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(FieldmapError::Io(format!("Expected at least 3D array, got {}D", shape.len())));
    }
    if shape.len() > 4 && shape[4..].iter().any(|&d| d > 1) {
        return Err(FieldmapError::Io(format!("Unsupported {}D volume with shape {:?}", shape.len(), shape)));
    }

    let dims = (shape[0], shape[1], shape[2]);
    let n_vols = if shape.len() >= 4 { shape[3] } else { 1 };

    // Reversed axes iterate with x fastest: index = x + y*nx + z*nx*ny + t*nx*ny*nz
    let data: Vec<f64> = array.t().iter().cloned().collect();

    Volume::new(data, dims, n_vols, voxel_size, affine)
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        // Fall back to identity with voxel scaling
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

fn dim_to_i16(value: usize, name: &str) -> Result<i16> {
    i16::try_from(value)
        .map_err(|_| FieldmapError::Io(format!("Dimension {}={} exceeds NIfTI-1 limit", name, value)))
}

/// Encode a volume as uncompressed NIfTI-1 bytes (float32)
pub fn save_nifti(volume: &Volume) -> Result<Vec<u8>> {
    let (nx, ny, nz) = volume.dims;
    let nt = volume.n_vols;
    let (vsx, vsy, vsz) = volume.voxel_size;
    let affine = &volume.affine;

    let mut header = [0u8; HEADER_SIZE];

    header[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());

    // dim[0..7]
    let ndim: i16 = if nt > 1 { 4 } else { 3 };
    let dim: [i16; 8] = [
        ndim,
        dim_to_i16(nx, "nx")?,
        dim_to_i16(ny, "ny")?,
        dim_to_i16(nz, "nz")?,
        dim_to_i16(nt, "nt")?,
        1, 1, 1,
    ];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 16 (FLOAT32), bitpix = 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = header + 4 bytes extension flag
    header[108..112].copy_from_slice(&(VOX_OFFSET as f32).to_le_bytes());

    // scl_slope = 1.0, scl_inter = 0.0
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // xyzt_units: mm + s
    header[123] = 2 | 8;

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    // srow_x, srow_y, srow_z
    for row in 0..3 {
        for col in 0..4 {
            let offset = 280 + row * 16 + col * 4;
            header[offset..offset + 4].copy_from_slice(&(affine[row * 4 + col] as f32).to_le_bytes());
        }
    }

    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(VOX_OFFSET + volume.data.len() * 4);
    buffer.write_all(&header)?;
    buffer.write_all(&[0u8; 4])?;
    for &val in &volume.data {
        buffer.write_all(&(val as f32).to_le_bytes())?;
    }

    Ok(buffer)
}

/// Encode a volume as gzipped NIfTI-1 bytes (.nii.gz)
pub fn save_nifti_gz(volume: &Volume) -> Result<Vec<u8>> {
    let uncompressed = save_nifti(volume)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&uncompressed)
        .map_err(|e| FieldmapError::Io(format!("Gzip compression failed: {}", e)))?;
    encoder.finish()
        .map_err(|e| FieldmapError::Io(format!("Gzip finish failed: {}", e)))
}

/// Encode a volume for the given path (.nii.gz is compressed, anything else is not)
pub fn encode_for_path(volume: &Volume, path: &Path) -> Result<Vec<u8>> {
    if path.to_string_lossy().ends_with(".nii.gz") {
        save_nifti_gz(volume)
    } else {
        save_nifti(volume)
    }
}

/// Read a NIfTI file from a filesystem path
pub fn read_nifti_file(path: &Path) -> Result<Volume> {
    let bytes = std::fs::read(path)
        .map_err(|e| FieldmapError::Io(format!("Failed to read file '{}': {}", path.display(), e)))?;
    load_nifti(&bytes).map_err(|e| match e {
        FieldmapError::Io(msg) => FieldmapError::Io(format!("'{}': {}", path.display(), msg)),
        other => other,
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "volume".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

/// Write bytes to `path` through a temporary sibling and a rename
///
/// Either the complete file appears at `path` or nothing does.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);
    let written = std::fs::File::create(&tmp)
        .and_then(|mut f| {
            f.write_all(bytes)?;
            f.sync_all()
        })
        .and_then(|_| std::fs::rename(&tmp, path));

    written.map_err(|e| {
        std::fs::remove_file(&tmp).ok();
        FieldmapError::Io(format!("Failed to write file '{}': {}", path.display(), e))
    })
}

/// Save a volume to a file
///
/// If the path ends with .nii.gz, the file is gzip compressed.
pub fn save_nifti_to_file(path: &Path, volume: &Volume) -> Result<()> {
    let bytes = encode_for_path(volume, path)?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: [f64; 16] = [
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ];

    fn volume_3d(data: Vec<f64>, dims: (usize, usize, usize), voxel_size: (f64, f64, f64), affine: [f64; 16]) -> Volume {
        Volume::new(data, dims, 1, voxel_size, affine).unwrap()
    }

    #[test]
    fn test_affine_identity() {
        let mut header = NiftiHeader::default();
        header.pixdim[1] = 1.0;
        header.pixdim[2] = 2.0;
        header.pixdim[3] = 3.0;
        header.sform_code = 0;

        let affine = get_affine(&header);
        assert_eq!(affine[0], 1.0);
        assert_eq!(affine[5], 2.0);
        assert_eq!(affine[10], 3.0);
    }

    #[test]
    fn test_affine_sform() {
        let mut header = NiftiHeader::default();
        header.sform_code = 1;
        header.srow_x = [-1.0, 0.0, 0.0, 10.0];
        header.srow_y = [0.0, 2.0, 0.0, 20.0];
        header.srow_z = [0.0, 0.0, 3.0, 30.0];

        let affine = get_affine(&header);
        assert_eq!(affine[0], -1.0);
        assert_eq!(affine[3], 10.0);
        assert_eq!(affine[5], 2.0);
        assert_eq!(affine[7], 20.0);
        assert_eq!(affine[10], 3.0);
        assert_eq!(affine[11], 30.0);
        assert_eq!(affine[15], 1.0);
    }

    #[test]
    fn test_gzip_detection() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x00]));
        assert!(!is_gzip(&[0x00, 0x00, 0x00]));
        assert!(!is_gzip(&[0x1f]));
    }

    #[test]
    fn test_save_nifti_header_details() {
        let vol = volume_3d((1..=8).map(|v| v as f64).collect(), (2, 2, 2), (1.5, 2.5, 3.5), [
            1.5, 0.0, 0.0, 5.0,
            0.0, 2.5, 0.0, 10.0,
            0.0, 0.0, 3.5, 15.0,
            0.0, 0.0, 0.0, 1.0,
        ]);
        let bytes = save_nifti(&vol).unwrap();

        assert_eq!(bytes.len(), VOX_OFFSET + 8 * 4);
        assert_eq!(&bytes[344..348], b"n+1\0");
        assert_eq!(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 348);
        assert_eq!(i16::from_le_bytes([bytes[70], bytes[71]]), 16);
        assert_eq!(i16::from_le_bytes([bytes[72], bytes[73]]), 32);
        assert_eq!(i16::from_le_bytes([bytes[40], bytes[41]]), 3);
        assert_eq!(i16::from_le_bytes([bytes[42], bytes[43]]), 2);
        assert_eq!(f32::from_le_bytes([bytes[108], bytes[109], bytes[110], bytes[111]]), 352.0);
        assert_eq!(i16::from_le_bytes([bytes[254], bytes[255]]), 1);

        let srow_y3 = f32::from_le_bytes([bytes[308], bytes[309], bytes[310], bytes[311]]);
        assert!((srow_y3 - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_save_nifti_4d_header() {
        let vol = Volume::new(vec![0.0; 2 * 2 * 2 * 3], (2, 2, 2), 3, (1.0, 1.0, 1.0), IDENTITY).unwrap();
        let bytes = save_nifti(&vol).unwrap();

        assert_eq!(i16::from_le_bytes([bytes[40], bytes[41]]), 4);
        assert_eq!(i16::from_le_bytes([bytes[48], bytes[49]]), 3);
        assert_eq!(bytes.len(), VOX_OFFSET + 24 * 4);
    }

    #[test]
    fn test_save_nifti_rejects_oversized_dims() {
        let vol = Volume::new(vec![0.0; 40000], (40000, 1, 1), 1, (1.0, 1.0, 1.0), IDENTITY).unwrap();
        assert!(matches!(save_nifti(&vol), Err(FieldmapError::Io(_))));
    }

    #[test]
    fn test_save_and_read_nifti_roundtrip() {
        let dims = (4, 3, 2);
        let n = dims.0 * dims.1 * dims.2;
        let affine = [
            1.0, 0.1, 0.2, 10.0,
            0.3, 2.0, 0.4, 20.0,
            0.5, 0.6, 3.0, 30.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let data: Vec<f64> = (0..n).map(|i| (i as f64) * 0.5 + 1.0).collect();
        let vol = volume_3d(data.clone(), dims, (1.0, 2.0, 3.0), affine);

        let tmp_path = std::env::temp_dir().join("b0map_test_nifti_roundtrip.nii");
        save_nifti_to_file(&tmp_path, &vol).unwrap();
        let loaded = read_nifti_file(&tmp_path).unwrap();

        assert_eq!(loaded.dims, dims, "Dimensions should match");
        assert_eq!(loaded.n_vols, 1);
        assert!((loaded.voxel_size.1 - 2.0).abs() < 1e-5, "Voxel size Y mismatch");
        for i in 0..n {
            assert!(
                (loaded.data[i] - data[i]).abs() < 1e-5,
                "Data mismatch at index {}: expected {}, got {}",
                i, data[i], loaded.data[i]
            );
        }
        for i in 0..16 {
            assert!((loaded.affine[i] - affine[i]).abs() < 1e-5, "Affine[{}] mismatch", i);
        }

        std::fs::remove_file(&tmp_path).ok();
    }

    #[test]
    fn test_4d_gzip_roundtrip_keeps_frames() {
        let dims = (3, 2, 2);
        let n = dims.0 * dims.1 * dims.2;
        let data: Vec<f64> = (0..2 * n).map(|i| i as f64).collect();
        let vol = Volume::new(data.clone(), dims, 2, (1.0, 1.0, 1.0), IDENTITY).unwrap();

        let tmp_path = std::env::temp_dir().join("b0map_test_nifti_4d.nii.gz");
        save_nifti_to_file(&tmp_path, &vol).unwrap();

        let bytes = std::fs::read(&tmp_path).unwrap();
        assert!(is_gzip(&bytes), "File should be gzip compressed");

        let loaded = read_nifti_file(&tmp_path).unwrap();
        assert_eq!(loaded.dims, dims);
        assert_eq!(loaded.n_vols, 2);
        // Fortran order inside each frame, frames consecutive
        for i in 0..2 * n {
            assert!((loaded.data[i] - data[i]).abs() < 1e-5, "Mismatch at {}", i);
        }

        std::fs::remove_file(&tmp_path).ok();
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = std::env::temp_dir().join("b0map_test_atomic");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.nii");

        write_atomic(&path, b"payload").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");

        let leftovers: Vec<_> = std::fs::read_dir(&dir).unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "Temporary file should have been renamed");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_atomic_into_missing_dir_fails() {
        let path = std::env::temp_dir().join("b0map_no_such_dir_12345").join("out.nii");
        let result = write_atomic(&path, b"payload");
        assert!(matches!(result, Err(FieldmapError::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_nifti_invalid_bytes() {
        assert!(matches!(load_nifti(&[0u8; 10]), Err(FieldmapError::Io(_))));
        assert!(matches!(load_nifti(&[0x1f, 0x8b, 0x00, 0x00, 0x00]), Err(FieldmapError::Io(_))));
    }

    #[test]
    fn test_get_header_info() {
        assert!(get_header_info(&[0u8; 10]).contains("too small"));

        let mut bytes = vec![0u8; 348];
        bytes[0..4].copy_from_slice(&348i32.to_le_bytes());
        bytes[344..348].copy_from_slice(b"n+1\0");
        bytes[70..72].copy_from_slice(&16i16.to_le_bytes());
        let info = get_header_info(&bytes);
        assert!(info.contains("sizeof_hdr=348"));
        assert!(info.contains("datatype=16"));
    }

    #[test]
    fn test_read_nonexistent_file() {
        let result = read_nifti_file(Path::new("/tmp/b0map_nonexistent_file_12345.nii"));
        match result {
            Err(FieldmapError::Io(msg)) => {
                assert!(msg.contains("Failed to read file"), "Error should mention file reading: {}", msg);
            }
            other => panic!("Expected Io error, got {:?}", other.map(|v| v.dims)),
        }
    }
}
