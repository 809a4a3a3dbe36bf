//! Output writers for simulation results: summary tables, raw
//! experiment-format records, JSON event dumps, sky maps and efficiency
//! grids.

use std::f64::consts::FRAC_PI_2;
use std::io::Write;

use muonsim_core::efficiency::EfficiencyPoint;
use muonsim_core::experiment::ComparisonRow;
use muonsim_core::{Counter, Event, SimError, SkyMapEntry};

/// Writes the per-identity summary table, sorted by descending count.
pub fn write_table(
    out: &mut impl Write,
    registry: &std::collections::HashMap<String, Counter>,
    multiplicity: Option<usize>,
) -> Result<(), SimError> {
    writeln!(out, "name\tsimCounts\tphi\ttheta\tangleErr")?;

    let mut counters: Vec<&Counter> = registry.values().collect();
    counters.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));

    for counter in counters {
        if multiplicity.is_some_and(|m| counter.multiplicity != m) {
            continue;
        }
        writeln!(
            out,
            "{}\t{}\t{:.3}\t{:.3}\t{:.3}",
            counter.id,
            counter.count,
            counter.mean_phi(),
            FRAC_PI_2 - counter.mean_theta(),
            counter.angle_err()
        )?;
    }
    Ok(())
}

/// Writes events in the raw experiment-data format.
pub fn write_raw(out: &mut impl Write, events: &[Event]) -> Result<(), SimError> {
    for event in events {
        for line in event.raw_lines() {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

/// Writes events as a pretty-printed JSON array.
pub fn write_json(out: &mut impl Write, events: &[Event]) -> Result<(), SimError> {
    let records: Vec<_> = events.iter().map(Event::record).collect();
    serde_json::to_writer_pretty(&mut *out, &records)?;
    writeln!(out)?;
    Ok(())
}

/// Writes the experiment-vs-simulation comparison table.
pub fn write_comparison(out: &mut impl Write, rows: &[ComparisonRow]) -> Result<(), SimError> {
    writeln!(out, "name\tdataCounts\tsimCounts\tphi\ttheta\tangleErr")?;
    for row in rows {
        writeln!(
            out,
            "{}\t{}\t{}\t{:.3}\t{:.3}\t{:.3}",
            row.identity,
            row.data_count,
            row.sim_count,
            row.mean_phi,
            FRAC_PI_2 - row.mean_theta,
            row.angle_err
        )?;
    }
    Ok(())
}

/// Writes a reconstructed sky map, normalizing bin weights by the trial
/// count.
pub fn write_skymap(
    out: &mut impl Write,
    map: &[SkyMapEntry],
    n: u64,
    empirical_seed: bool,
) -> Result<(), SimError> {
    writeln!(out, "# Differential flux using {n} simulated muons")?;
    if empirical_seed {
        writeln!(out, "# Empirical initial distribution")?;
    } else {
        writeln!(out, "# Uniform initial distribution")?;
    }
    writeln!(out, "# theta\tphi\tprobability")?;
    for entry in map {
        writeln!(out, "{}\t{}\t{}", entry.theta, entry.phi, entry.value / n as f64)?;
    }
    Ok(())
}

/// Writes a directional efficiency grid.
pub fn write_efficiency(out: &mut impl Write, points: &[EfficiencyPoint]) -> Result<(), SimError> {
    writeln!(out, "# theta\tphi\tefficiency")?;
    for point in points {
        writeln!(
            out,
            "{}\t{}\t{:.6}",
            point.theta_deg, point.phi_deg, point.efficiency
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use muonsim_core::Track;

    #[test]
    fn test_write_skymap_normalizes() {
        let map = vec![SkyMapEntry::new(30.5, 10.5, 50.0)];
        let mut buf = Vec::new();

        write_skymap(&mut buf, &map, 100, false).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("# Uniform initial distribution"));
        assert!(text.contains("30.5\t10.5\t0.5"));
    }

    #[test]
    fn test_write_raw_format() {
        let track = Track::from_angles(0.0, 0.0, 1.0, 0.0);
        let events = vec![Event::new(track, vec!["SC85_2".into()])];
        let mut buf = Vec::new();

        write_raw(&mut buf, &events).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("0 -1 -1 -1 -1 xxxxxxxxxxxxxxxx\n"));
        assert!(text.contains("1 85 -1 -1 -1 0010000000000000"));
    }

    #[test]
    fn test_write_json_records() {
        let track = Track::from_angles(1.0, 2.0, 0.5, -0.5);
        let events = vec![Event::new(track, vec!["SC85_0".into()])];
        let mut buf = Vec::new();

        write_json(&mut buf, &events).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        assert_eq!(parsed[0]["hits"][0], "SC85_0");
        assert!((parsed[0]["track"]["theta"].as_f64().unwrap() - 0.5).abs() < 1e-9);
    }
}
