use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use arrow::array::Float64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rusty_spectra::data::fits::write_fits;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Power-law continuum with absorption lines `(centre nm, sigma nm, depth)`.
fn generate_spectrum(
    wavelengths_nm: &[f64],
    lines: &[(f64, f64, f64)],
    noise_level: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    wavelengths_nm
        .iter()
        .map(|&nm| {
            let continuum = 2.0 * (nm / 550.0).powf(-1.5);
            let absorption: f64 = lines
                .iter()
                .map(|&(mu, sigma, depth)| gaussian(nm, mu, sigma, depth))
                .sum();
            continuum * (1.0 - absorption.min(0.95)) + rng.gauss(0.0, noise_level)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

// Vacuum nm, matching the bundled reference table.
const STELLAR_LINES: &[(f64, f64, f64)] = &[
    (393.4777, 0.6, 0.7),
    (396.9591, 0.6, 0.6),
    (486.2721, 0.8, 0.5),
    (517.4125, 0.3, 0.3),
    (589.1583, 0.15, 0.6),
    (589.7558, 0.15, 0.5),
    (656.4614, 1.0, 0.6),
    (850.0, 0.4, 0.3),
    (854.4, 0.4, 0.4),
    (866.4, 0.4, 0.35),
];

/// Delimited text in nm / Jy with header-comment metadata.
fn write_csv(path: &Path, rng: &mut SimpleRng) -> anyhow::Result<usize> {
    let wavelengths: Vec<f64> = (0..=600).map(|i| 400.0 + i as f64 * 0.5).collect();
    let flux = generate_spectrum(&wavelengths, STELLAR_LINES, 0.01, rng);

    let mut file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    writeln!(file, "# OBJECT = Demo Star")?;
    writeln!(file, "# INSTRUME = SIMULATED")?;
    writeln!(file, "# DATE-OBS = 2024-03-14")?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["wavelength_nm", "flux_jy"])?;
    for (w, f) in wavelengths.iter().zip(&flux) {
        writer.write_record([w.to_string(), f.to_string()])?;
    }
    writer.flush()?;
    Ok(wavelengths.len())
}

/// Parquet in vacuum Angstrom / mJy, overlapping the CSV sample in 650–700 nm.
fn write_parquet(path: &Path, rng: &mut SimpleRng) -> anyhow::Result<usize> {
    let wavelengths_nm: Vec<f64> = (0..=1000).map(|i| 650.0 + i as f64 * 0.25).collect();
    let flux_mjy: Vec<f64> = generate_spectrum(&wavelengths_nm, STELLAR_LINES, 0.02, rng)
        .into_iter()
        .map(|jy| jy * 1e3)
        .collect();
    let angstrom: Vec<f64> = wavelengths_nm.iter().map(|nm| nm * 10.0).collect();

    let unit = |u: &str| HashMap::from([("unit".to_string(), u.to_string())]);
    let mut meta = HashMap::new();
    meta.insert("OBJECT".to_string(), "Demo Star".to_string());
    meta.insert("INSTRUME".to_string(), "SIMULATED-RED".to_string());
    let schema = Arc::new(
        Schema::new(vec![
            Field::new("wavelength", DataType::Float64, false).with_metadata(unit("Angstrom")),
            Field::new("flux", DataType::Float64, false).with_metadata(unit("mJy")),
        ])
        .with_metadata(meta),
    );
    let n = angstrom.len();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(Float64Array::from(angstrom)), Arc::new(Float64Array::from(flux_mjy))],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(n)
}

/// FITS 1-D primary image on an air-wavelength Angstrom axis.
fn write_fits_image(path: &Path, rng: &mut SimpleRng) -> anyhow::Result<usize> {
    let n = 800;
    let crval = 4800.0;
    let cdelt = 0.5;
    let air_nm: Vec<f64> = (0..n).map(|i| (crval + i as f64 * cdelt) / 10.0).collect();
    // Close enough for synthetic data: shift the vacuum line list by ~0.14 nm.
    let lines: Vec<(f64, f64, f64)> = STELLAR_LINES.iter().map(|&(mu, s, d)| (mu - 0.14, s, d)).collect();
    let flux = generate_spectrum(&air_nm, &lines, 0.01, rng);

    let mut data = Vec::with_capacity(n * 4);
    for f in &flux {
        // Jy → erg/s/cm²/Hz
        data.extend_from_slice(&((f * 1e-23) as f32).to_be_bytes());
    }
    let c = |k: &str, v: String| (k.to_string(), v);
    let bytes = write_fits(&[(
        vec![
            c("SIMPLE", "T".into()),
            c("BITPIX", "-32".into()),
            c("NAXIS", "1".into()),
            c("NAXIS1", n.to_string()),
            c("CTYPE1", "'AWAV'".into()),
            c("CUNIT1", "'Angstrom'".into()),
            c("CRVAL1", format!("{crval:.1}")),
            c("CRPIX1", "1.0".into()),
            c("CDELT1", format!("{cdelt:.1}")),
            c("BUNIT", "'erg/s/cm2/Hz'".into()),
            c("OBJECT", "'Demo Star'".into()),
            c("INSTRUME", "'SIMULATED-BLUE'".into()),
        ],
        data,
    )]);
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(n)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    let outputs: [(&str, fn(&Path, &mut SimpleRng) -> anyhow::Result<usize>); 3] = [
        ("sample_blue.fits", write_fits_image),
        ("sample_visible.csv", write_csv),
        ("sample_red.parquet", write_parquet),
    ];
    for (name, write) in outputs {
        let path = Path::new(name);
        let samples = write(path, &mut rng)?;
        println!("Wrote {samples} samples to {}", path.display());
    }
    Ok(())
}
