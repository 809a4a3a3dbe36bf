//! Experimental frequency data: parsing and comparison against
//! simulation results.

use std::collections::HashMap;
use std::io::BufRead;

use tracing::info;

use crate::error::SimError;
use crate::simulation::Counter;

/// Parses the block-structured experiment frequency format.
///
/// A block opens with a count line (`<label> <count>`), lists one
/// detector channel per line (prefixed into `SC` pixel names), and is
/// closed by a `#` header line. The block's identity is the sorted
/// bracketed channel list, matching simulated event identities.
pub fn read_data(reader: impl BufRead) -> Result<HashMap<String, u32>, SimError> {
    let mut data = HashMap::new();

    let mut count = 0u32;
    let mut names: Vec<String> = Vec::new();
    let mut block_begin = true;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if block_begin {
            let field = line.split(' ').nth(1).ok_or_else(|| {
                SimError::data(format!("experiment data line {}: missing count", line_no + 1))
            })?;
            count = field.parse().map_err(|_| {
                SimError::data(format!(
                    "experiment data line {}: bad count {:?}",
                    line_no + 1,
                    field
                ))
            })?;
            block_begin = false;
        } else if line.starts_with('#') {
            names.sort_unstable();
            names.dedup();
            data.insert(format!("[{}]", names.join(", ")), count);
            names.clear();
            block_begin = true;
        } else {
            let channel = line.split(' ').next().unwrap_or("");
            names.push(format!("SC{channel}"));
        }
    }

    Ok(data)
}

/// One row of the experiment-vs-simulation comparison table.
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    /// Hit-pattern identity.
    pub identity: String,

    /// Experimentally observed count.
    pub data_count: u32,

    /// Simulated count.
    pub sim_count: u64,

    /// Mean azimuth of the simulated counter, radians.
    pub mean_phi: f64,

    /// Mean elevation of the simulated counter, radians.
    pub mean_theta: f64,

    /// Angular dispersion of the simulated counter.
    pub angle_err: f64,
}

/// Joins experimental counts with simulated counters per identity.
///
/// Identities the simulation never produced are dropped; an optional
/// multiplicity filter restricts the rows. Returns the rows plus the
/// total simulated and observed counts that survived the join.
pub fn compare(
    data: &HashMap<String, u32>,
    registry: &HashMap<String, Counter>,
    multiplicity: Option<usize>,
) -> (Vec<ComparisonRow>, u64, u64) {
    let mut rows = Vec::new();
    let mut sim_total = 0u64;
    let mut data_total = 0u64;

    for (identity, &data_count) in data {
        let Some(counter) = registry.get(identity) else {
            continue;
        };
        if multiplicity.is_some_and(|m| counter.multiplicity != m) {
            continue;
        }
        sim_total += counter.count;
        data_total += u64::from(data_count);
        rows.push(ComparisonRow {
            identity: identity.clone(),
            data_count,
            sim_count: counter.count,
            mean_phi: counter.mean_phi(),
            mean_theta: counter.mean_theta(),
            angle_err: counter.angle_err(),
        });
    }

    rows.sort_by(|a, b| b.sim_count.cmp(&a.sim_count).then(a.identity.cmp(&b.identity)));
    info!(
        rows = rows.len(),
        sim_total, data_total, "joined experiment data with simulation"
    );
    (rows, sim_total, data_total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_data_blocks() {
        let input = "\
total 120
01_0 x
03_5 x
# next block
total 45
02_1 x
#
";
        let data = read_data(input.as_bytes()).unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data.get("[SC01_0, SC03_5]"), Some(&120));
        assert_eq!(data.get("[SC02_1]"), Some(&45));
    }

    #[test]
    fn test_read_data_sorts_channels() {
        let input = "total 7\n03_5 x\n01_0 x\n#\n";
        let data = read_data(input.as_bytes()).unwrap();

        assert_eq!(data.get("[SC01_0, SC03_5]"), Some(&7));
    }

    #[test]
    fn test_read_data_rejects_bad_count() {
        let input = "total many\n01_0 x\n#\n";

        assert!(matches!(
            read_data(input.as_bytes()),
            Err(SimError::MalformedData(_))
        ));
    }

    #[test]
    fn test_unclosed_trailing_block_is_dropped() {
        let input = "total 9\n01_0 x\n";
        let data = read_data(input.as_bytes()).unwrap();

        assert!(data.is_empty());
    }
}
