//! CSV persistence of calibration tables.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::CalibrationRow;

const HEADERS: [&str; 2] = ["slope", "power"];

pub fn load_calibration_csv(path: &Path) -> eyre::Result<Vec<CalibrationRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != HEADERS {
        eyre::bail!(
            "calibration CSV must have headers 'slope,power', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    crate::check_points(&rows)?;
    Ok(rows)
}

/// Write `rows` to `path`, replacing any previous table atomically: the CSV
/// goes to a sibling temp file which is fsynced and renamed over the target.
pub fn save_calibration_csv(path: &Path, rows: &[CalibrationRow]) -> eyre::Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| eyre::eyre!("encode calibration row: {}", e))?;
    }
    if rows.is_empty() {
        wtr.write_record(HEADERS)
            .map_err(|e| eyre::eyre!("encode calibration headers: {}", e))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| eyre::eyre!("flush calibration CSV: {}", e))?;

    let tmp = path.with_extension("new");
    {
        let mut f =
            fs::File::create(&tmp).map_err(|e| eyre::eyre!("create {:?}: {}", tmp, e))?;
        f.write_all(&bytes)
            .and_then(|()| f.sync_all())
            .map_err(|e| eyre::eyre!("write {:?}: {}", tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| eyre::eyre!("replace {:?}: {}", path, e))
}
