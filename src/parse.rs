//! Reading the tabular inputs of a planning run.
//!
//! All files are headerless CSV, except the distance matrix whose first row and column carry the
//! location labels. Values are read as plain numbers; rounding and validation happen when the
//! [`Problem`](crate::problem::Problem) is constructed.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;

use crate::problem::{DataInconsistencyError, Distance, Input, Inputs};
use crate::Error;

/// Locations of the four input files
#[derive(Debug, Clone)]
pub struct InputPaths {
    /// One row per outlet, one column per period
    pub demand: PathBuf,
    /// A single row with the starting stock of every outlet
    pub stock: PathBuf,
    /// A single row with the quantity arriving at every outlet at the start of period 0
    pub in_transit: PathBuf,
    /// Labelled distance matrix, warehouse first
    pub distances: PathBuf,
}

fn records(path: &Path) -> Result<Vec<StringRecord>, Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    let records = reader.records().collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

fn number(
    value: &str,
    input: Input,
    record: usize,
    field: usize,
) -> Result<f64, DataInconsistencyError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DataInconsistencyError::NotNumeric {
            input,
            record,
            field,
            value: value.to_string(),
        })
}

fn numbers(
    record: &StringRecord,
    input: Input,
    index: usize,
) -> Result<Vec<f64>, DataInconsistencyError> {
    record
        .iter()
        .enumerate()
        .map(|(field, value)| number(value, input, index, field))
        .collect()
}

/// Reads the demand forecast: one row per outlet, one column per period.
pub fn read_demand(path: &Path) -> Result<Vec<Vec<f64>>, Error> {
    let rows = records(path)?
        .iter()
        .enumerate()
        .map(|(i, record)| numbers(record, Input::Demand, i))
        .collect::<Result<Vec<_>, _>>()?;
    if rows.is_empty() {
        return Err(DataInconsistencyError::NoOutlets(Input::Demand).into());
    }
    debug!("Read demand for {} outlets from {}", rows.len(), path.display());
    Ok(rows)
}

/// Reads a file holding a single row with one value per outlet
pub fn read_row(path: &Path, input: Input) -> Result<Vec<f64>, Error> {
    let records = records(path)?;
    match records.as_slice() {
        [] => Err(DataInconsistencyError::Malformed {
            input,
            record: 0,
            message: String::from("the file is empty"),
        }
        .into()),
        [record] => Ok(numbers(record, input, 0)?),
        _ => Err(DataInconsistencyError::Malformed {
            input,
            record: 1,
            message: format!("expected a single row, found {}", records.len()),
        }
        .into()),
    }
}

/// Reads the labelled distance matrix. The first row is a header and is skipped, the first
/// column of every other row is the location label.
pub fn read_distances(path: &Path) -> Result<(Vec<String>, Vec<Vec<Distance>>), Error> {
    let records = records(path)?;
    if records.len() < 2 {
        return Err(DataInconsistencyError::Malformed {
            input: Input::Distances,
            record: records.len(),
            message: String::from("expected a header row followed by one row per location"),
        }
        .into());
    }

    let mut labels = Vec::with_capacity(records.len() - 1);
    let mut matrix = Vec::with_capacity(records.len() - 1);
    for (i, record) in records.iter().enumerate().skip(1) {
        let label = record.get(0).unwrap_or_default();
        labels.push(label.to_string());
        let row = record
            .iter()
            .enumerate()
            .skip(1)
            .map(|(field, value)| number(value, Input::Distances, i, field))
            .collect::<Result<Vec<_>, _>>()?;
        matrix.push(row);
    }

    debug!("Read distances between {} locations", labels.len());
    Ok((labels, matrix))
}

/// Reads all four inputs of a run
pub fn read_inputs(paths: &InputPaths) -> Result<Inputs, Error> {
    let demand = read_demand(&paths.demand)?;
    let stock = read_row(&paths.stock, Input::Stock)?;
    let in_transit = read_row(&paths.in_transit, Input::InTransit)?;
    let (locations, distances) = read_distances(&paths.distances)?;

    Ok(Inputs {
        locations,
        distances,
        demand,
        stock,
        in_transit,
    })
}
