use std::fs;
use std::path::Path;

use anyhow::Context;
use basinio_model::{Project, SnapShot};
use basinio_xml::{export_project, import_project, ExportConfig};
use colored::Colorize;
use serde::Serialize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Info(args) => cmd_info(args, cli.format),
        Command::Verify(args) => cmd_verify(args, cli.format),
        Command::Convert(args) => cmd_convert(args, cli.format),
    }
}

#[derive(Debug, Serialize)]
struct SnapshotSummary {
    age: f64,
    kind: String,
    minor: bool,
    surfaces: usize,
    volume_properties: usize,
    formation_volumes: usize,
    trappers: usize,
}

#[derive(Debug, Serialize)]
struct ProjectSummary {
    name: String,
    description: String,
    mode: String,
    xml_version: String,
    properties: usize,
    formations: Vec<String>,
    reservoirs: Vec<String>,
    geometries: usize,
    record_tables: Vec<(&'static str, usize)>,
    snapshots: Vec<SnapshotSummary>,
}

fn summarize(project: &Project) -> ProjectSummary {
    let (major, minor) = project.xml_version();
    ProjectSummary {
        name: project.info().name.clone(),
        description: project.info().description.clone(),
        mode: format!("{:?}", project.info().mode),
        xml_version: format!("{major}.{minor}"),
        properties: project.properties().len(),
        formations: project.formations().iter().map(|f| f.name().to_owned()).collect(),
        reservoirs: project.reservoirs().iter().map(|r| r.name().to_owned()).collect(),
        geometries: project.geometries().len(),
        record_tables: project.records.counts().into_iter().filter(|(_, n)| *n > 0).collect(),
        snapshots: project.snapshots().iter().map(summarize_snapshot).collect(),
    }
}

fn summarize_snapshot(snapshot: &SnapShot) -> SnapshotSummary {
    SnapshotSummary {
        age: snapshot.age(),
        kind: format!("{:?}", snapshot.kind()),
        minor: snapshot.is_minor(),
        surfaces: snapshot.surfaces().len(),
        volume_properties: snapshot.volume().map_or(0, |v| v.property_data().len()),
        formation_volumes: snapshot.formation_volumes().len(),
        trappers: snapshot.trappers().len(),
    }
}

fn cmd_info(args: InfoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let project = import_project(&args.xml).with_context(|| format!("reading {}", args.xml.display()))?;
    let summary = summarize(&project);
    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Project {} ({})", summary.name.bold(), summary.mode.cyan());
    if !summary.description.is_empty() {
        println!("  {}", summary.description);
    }
    println!("  XML version: {}", summary.xml_version);
    println!("  Properties: {}  Geometries: {}", summary.properties, summary.geometries);
    println!("  Formations: {}", summary.formations.join(", ").yellow());
    if !summary.reservoirs.is_empty() {
        println!("  Reservoirs: {}", summary.reservoirs.join(", ").yellow());
    }
    for (table, count) in &summary.record_tables {
        println!("  Table {}: {} records", table.bold(), count);
    }
    println!("  Snapshots: {}", summary.snapshots.len().to_string().bold());
    for s in &summary.snapshots {
        let minor = if s.minor { " minor" } else { "" };
        println!(
            "    {:>10.3} Ma{}  surfaces {}  volume {}  formation volumes {}  trappers {}",
            s.age, minor.dimmed(), s.surfaces, s.volume_properties, s.formation_volumes, s.trappers
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ValueRange {
    location: String,
    property: String,
    min: f32,
    max: f32,
}

#[derive(Debug, Serialize)]
struct SnapshotCheck {
    age: f64,
    units: usize,
    files: usize,
    ranges: Vec<ValueRange>,
}

/// Retrieve `snapshot`, record every unit's value range, then release it.
fn check_snapshot(snapshot: &mut SnapShot, threads: usize) -> anyhow::Result<SnapshotCheck> {
    let age = snapshot.age();
    let stats = snapshot.retrieve_with(threads).with_context(|| format!("retrieving snapshot {age}"))?;
    let mut ranges = Vec::new();

    for surface in snapshot.surfaces_mut() {
        let location = format!("surface {}", surface.name());
        for (property, map) in surface.property_data_mut() {
            let (min, max) = map.min_max()?;
            ranges.push(ValueRange { location: location.clone(), property: property.name().to_owned(), min, max });
        }
    }
    let mut volumes: Vec<(String, &mut basinio_model::Volume)> = Vec::new();
    let (continuous, formation_volumes) = snapshot.volumes_split_mut();
    if let Some(volume) = continuous {
        volumes.push(("volume".into(), volume));
    }
    for (formation, volume) in formation_volumes.iter_mut() {
        volumes.push((format!("formation volume #{}", formation.index()), volume));
    }
    for (location, volume) in volumes {
        for (property, data) in volume.property_data_mut() {
            let (min, max) = data.min_max()?;
            ranges.push(ValueRange { location: location.clone(), property: property.name().to_owned(), min, max });
        }
    }

    snapshot.release();
    Ok(SnapshotCheck { age, units: stats.units, files: stats.files, ranges })
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut project = import_project(&args.xml).with_context(|| format!("reading {}", args.xml.display()))?;
    let checks = project
        .snapshots_mut()
        .iter_mut()
        .map(|snapshot| check_snapshot(snapshot, args.threads))
        .collect::<anyhow::Result<Vec<_>>>()?;

    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&checks)?);
        return Ok(());
    }
    for check in &checks {
        println!(
            "Snapshot {:.3} Ma: {} units from {} files",
            check.age,
            check.units.to_string().bold(),
            check.files
        );
        for range in &check.ranges {
            println!("  {:<32} {:<24} [{}, {}]", range.location, range.property.cyan(), range.min, range.max);
        }
    }
    println!("{} {} snapshots verified", "✓".green().bold(), checks.len());
    Ok(())
}

/// Export settings from `path`, or the defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<ExportConfig> {
    let Some(path) = path else {
        return Ok(ExportConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn cmd_convert(args: ConvertArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(threads) = args.threads {
        config.num_threads = threads;
    }
    config.center |= args.center;
    if args.no_compress {
        config.compress = false;
    }

    let baseline = args
        .baseline
        .as_deref()
        .map(|path| import_project(path).with_context(|| format!("reading baseline {}", path.display())))
        .transpose()?;
    let mut project = import_project(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let stats = export_project(&mut project, &args.output, &config, baseline.as_ref())
        .with_context(|| format!("writing {}", args.output.display()))?;

    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("{} Wrote {}", "✓".green().bold(), args.output.display().to_string().bold());
    println!("  Snapshots: {}", stats.snapshots);
    println!("  Payloads: {} ({} bytes)", stats.payloads, stats.bytes_written);
    println!("  Constants: {}", stats.constants);
    if stats.references > 0 {
        println!("  References: {}", stats.references.to_string().yellow());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basinio_data::MapData;
    use basinio_model::{Formation, ProjectInfo, Surface};
    use basinio_types::{Geometry2D, ModellingMode, Property, PropertyAttribute, PropertyType, SnapShotKind, SubsurfaceKind};

    use super::*;

    fn write_project(dir: &Path) -> std::path::PathBuf {
        let mut project = Project::new(ProjectInfo::new("Cli", ModellingMode::ThreeD)).unwrap();
        project.add_formation(Formation::new("Sand", 0, 1).unwrap()).unwrap();
        let geometry = project.geometries_mut().share(Geometry2D::new(2, 2, 1.0, 1.0, 0.0, 0.0)).1;
        let depth = project.add_property(
            Property::new("Depth", "Depth", "Depth", "m", PropertyType::Formation, PropertyAttribute::Continuous3D)
                .unwrap(),
        );
        let mut snapshot = SnapShot::new(0.0, SnapShotKind::System, false).unwrap();
        let mut surface = Surface::new("Top", SubsurfaceKind::Sediment).unwrap();
        surface
            .add_property_data(depth, MapData::from_values(geometry, &[5.0, 6.0, 7.0, 9.0]).unwrap())
            .unwrap();
        snapshot.add_surface(surface).unwrap();
        project.add_snapshot(snapshot).unwrap();

        let xml = dir.join("cli.xml");
        export_project(&mut project, &xml, &ExportConfig::default(), None).unwrap();
        xml
    }

    #[test]
    fn default_config_without_file() {
        assert_eq!(load_config(None).unwrap(), ExportConfig::default());
    }

    #[test]
    fn config_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.toml");
        fs::write(&path, "num_threads = 4\ncenter = true\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.num_threads, 4);
        assert!(config.center);
        assert!(config.compress);
    }

    #[test]
    fn bad_config_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.toml");
        fs::write(&path, "num_threads = \"many\"").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn summary_counts() {
        let dir = tempfile::tempdir().unwrap();
        let project = import_project(&write_project(dir.path())).unwrap();
        let summary = summarize(&project);
        assert_eq!(summary.name, "Cli");
        assert_eq!(summary.formations, vec!["Sand".to_string()]);
        assert_eq!(summary.snapshots.len(), 1);
        assert_eq!(summary.snapshots[0].surfaces, 1);
        assert!(summary.record_tables.is_empty());
    }

    #[test]
    fn verify_reports_ranges_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = import_project(&write_project(dir.path())).unwrap();
        let snapshot = &mut project.snapshots_mut()[0];
        let check = check_snapshot(snapshot, 2).unwrap();
        assert_eq!(check.units, 1);
        assert_eq!(check.ranges.len(), 1);
        assert_eq!((check.ranges[0].min, check.ranges[0].max), (5.0, 9.0));
        assert!(!snapshot.is_retrieved());
    }

    #[test]
    fn convert_to_new_location() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_project(dir.path());
        let output = dir.path().join("copy.xml");
        let args = ConvertArgs {
            input,
            output: output.clone(),
            threads: Some(2),
            center: false,
            no_compress: true,
            baseline: None,
            config: None,
        };
        cmd_convert(args, OutputFormat::Json).unwrap();
        let copy = import_project(&output).unwrap();
        assert_eq!(copy.snapshots().len(), 1);
        assert!(dir.path().join("copy_output").is_dir());
    }
}
