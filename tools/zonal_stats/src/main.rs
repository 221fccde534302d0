/// Zonal statistics driver: loads a raster and a polygon set, computes
/// per-polygon statistics serially or over a chunked worker pool, and writes
/// a GeoJSON FeatureCollection (one feature per polygon, geometry + input
/// properties + statistics).
///
/// Rasters:  GeoTIFF (.tif/.tiff, ModelPixelScale + ModelTiepoint or
///           ModelTransformation, GDAL_NODATA) or RasterGrid JSON (.json).
/// Polygons: GeoJSON FeatureCollection (.geojson/.json) or WKT, one per line
///           (.wkt/.txt). Polygon ids are the input order.
use std::fs;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use zonal_core::stats::builtin;
use zonal_core::{
    compute_stats, compute_stats_parallel, parse_wkt_lines, Affine, CellInclusion, ParallelConfig, Point, Polygon,
    RasterGrid, StatRegistry, StatisticsRecord, StatsConfig,
};

// ── Constants ────────────────────────────────────────────────────────────────

/// Benchmark statistics: built-ins plus the custom `model`.
const DEFAULT_STATS: [&str; 5] = ["min", "max", "count", "std", "model"];

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zonal_stats",
    about = "Zonal statistics of a raster under polygons, serial or chunked-parallel"
)]
struct Args {
    /// Raster grid: GeoTIFF (.tif/.tiff) or serialised RasterGrid (.json)
    #[arg(short, long)]
    raster: PathBuf,

    /// Polygons: GeoJSON FeatureCollection (.geojson/.json) or WKT lines (.wkt/.txt)
    #[arg(short, long)]
    polygons: PathBuf,

    /// Output GeoJSON FeatureCollection (omit to only log a summary)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Statistics to compute, comma separated [default: min,max,count,std,model]
    #[arg(short, long, value_delimiter = ',')]
    stats: Option<Vec<String>>,

    /// Include every cell touched by a polygon edge, not only centre-inside cells
    #[arg(long)]
    all_touched: bool,

    /// Override the raster's no-data value
    #[arg(long, allow_hyphen_values = true)]
    nodata: Option<f64>,

    /// Worker pool size; 1 runs the serial aggregator, 0 uses every CPU [default: 0]
    #[arg(short, long)]
    workers: Option<usize>,

    /// Polygons per chunk (default: one chunk per worker)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Run serial and parallel, check both agree, and report both timings
    #[arg(long)]
    compare: bool,

    /// JSON run configuration ({"stats": {...}, "parallel": {...}}); flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct RunConfig {
    stats: StatsConfig,
    parallel: ParallelConfig,
}

impl RunConfig {
    fn benchmark() -> Self {
        Self {
            stats: StatsConfig::with_stats(DEFAULT_STATS),
            parallel: ParallelConfig::default(),
        }
    }

    /// Config file (or the benchmark defaults) with command-line flags on top.
    fn from_args(args: &Args) -> Result<Self> {
        let mut run = match &args.config {
            Some(path) => serde_json::from_str(
                &fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
            )
            .with_context(|| format!("parsing {}", path.display()))?,
            None => Self::benchmark(),
        };
        if let Some(stats) = &args.stats {
            run.stats.stats = stats.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if args.all_touched {
            run.stats.inclusion = CellInclusion::AllTouched;
        }
        if args.nodata.is_some() {
            run.stats.nodata_override = args.nodata;
        }
        if let Some(workers) = args.workers {
            run.parallel.workers = workers;
        }
        if args.chunk_size.is_some() {
            run.parallel.chunk_size = args.chunk_size;
        }
        if run.stats.stats.is_empty() {
            bail!("no statistics requested");
        }
        Ok(run)
    }

    fn is_serial(&self) -> bool {
        self.parallel.workers == 1 && self.parallel.chunk_size.is_none()
    }
}

/// Built-ins plus the benchmark's user-defined `model` (max − min).
fn registry() -> StatRegistry {
    let mut reg = StatRegistry::default();
    reg.register("model", |v: &[f64]| Some(builtin::max(v)? - builtin::min(v)?));
    reg
}

// ── Raster loading ───────────────────────────────────────────────────────────

fn extension(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase()
}

fn load_raster(path: &Path) -> Result<RasterGrid> {
    let raster = match extension(path).as_str() {
        "tif" | "tiff" => {
            let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
            read_geotiff(BufReader::new(file))?
        }
        "json" => raster_from_json(&fs::read_to_string(path)?)?,
        other => bail!("unsupported raster format `.{other}` ({})", path.display()),
    };
    Ok(raster)
}

fn raster_from_json(text: &str) -> Result<RasterGrid> {
    let raster: RasterGrid = serde_json::from_str(text).context("parsing RasterGrid JSON")?;
    raster.validate()?;
    Ok(raster)
}

/// Decode the first band of a GeoTIFF into a georeferenced grid.
fn read_geotiff<R: Read + Seek>(reader: R) -> Result<RasterGrid> {
    let mut decoder = Decoder::new(reader).context("reading TIFF header")?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let transform = match decoder.find_tag(Tag::ModelTransformationTag)? {
        Some(v) => {
            let m = v.into_f64_vec()?;
            if m.len() < 8 {
                bail!("ModelTransformation has {} values, expected 16", m.len());
            }
            Affine::new(m[0], m[1], m[3], m[4], m[5], m[7])
        }
        None => {
            let scale = decoder
                .find_tag(Tag::ModelPixelScaleTag)?
                .context("GeoTIFF has neither ModelTransformation nor ModelPixelScale")?
                .into_f64_vec()?;
            let tie = decoder
                .find_tag(Tag::ModelTiepointTag)?
                .context("GeoTIFF has no ModelTiepoint")?
                .into_f64_vec()?;
            if scale.len() < 2 || tie.len() < 6 {
                bail!("malformed ModelPixelScale/ModelTiepoint");
            }
            let (sx, sy) = (scale[0], scale[1]);
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            Affine::new(sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy)
        }
    };

    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(v) => {
            let s = v.into_string()?;
            let s = s.trim_end_matches('\0').trim();
            Some(s.parse::<f64>().with_context(|| format!("GDAL_NODATA `{s}` is not a number"))?)
        }
        None => None,
    };

    let samples: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => bail!("unsupported TIFF sample format"),
    };

    let cells = width * height;
    if cells == 0 || samples.len() % cells != 0 {
        bail!("{} samples for a {width}×{height} image", samples.len());
    }
    let bands = samples.len() / cells;
    if bands > 1 {
        warn!(bands, "multi-band image, using band 1");
    }
    let values = samples.into_iter().step_by(bands).collect();
    Ok(RasterGrid::new(width, height, values, transform, nodata)?)
}

// ── Polygon loading ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct InCollection {
    features: Vec<InFeature>,
}

#[derive(Deserialize)]
struct InFeature {
    geometry: Option<InGeometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct InGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// Polygons with the input feature properties (empty for WKT input).
#[derive(Debug)]
struct PolygonSet {
    polygons: Vec<Polygon>,
    properties: Vec<Map<String, Value>>,
}

fn load_polygons(path: &Path) -> Result<PolygonSet> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match extension(path).as_str() {
        "geojson" | "json" => polygons_from_geojson(&text).with_context(|| format!("parsing {}", path.display())),
        "wkt" | "txt" => {
            let polygons = parse_wkt_lines(&text)?;
            let properties = vec![Map::new(); polygons.len()];
            Ok(PolygonSet { polygons, properties })
        }
        other => bail!("unsupported polygon format `.{other}` ({})", path.display()),
    }
}

fn polygons_from_geojson(text: &str) -> Result<PolygonSet> {
    let collection: InCollection = serde_json::from_str(text)?;
    let mut polygons = Vec::with_capacity(collection.features.len());
    let mut properties = Vec::with_capacity(collection.features.len());
    for (id, feature) in collection.features.into_iter().enumerate() {
        let geometry = feature.geometry.with_context(|| format!("feature {id} has no geometry"))?;
        if geometry.kind != "Polygon" {
            bail!("feature {id}: expected Polygon geometry, found {}", geometry.kind);
        }
        let rings: Vec<Vec<Vec<f64>>> = serde_json::from_value(geometry.coordinates)
            .with_context(|| format!("feature {id}: bad Polygon coordinates"))?;
        let mut rings = rings.into_iter().map(|ring| {
            ring.into_iter()
                .map(|pos| match pos.as_slice() {
                    [x, y, ..] => Ok(Point::new(*x, *y)),
                    _ => bail!("feature {id}: position with fewer than 2 ordinates"),
                })
                .collect::<Result<Vec<Point>>>()
        });
        let exterior = rings.next().with_context(|| format!("feature {id}: polygon has no rings"))??;
        let holes = rings.collect::<Result<Vec<_>>>()?;
        polygons.push(Polygon::with_holes(id, exterior, holes));
        properties.push(feature.properties.unwrap_or_default());
    }
    Ok(PolygonSet { polygons, properties })
}

// ── Output ───────────────────────────────────────────────────────────────────

fn polygon_geometry(polygon: &Polygon) -> Value {
    let rings: Vec<Vec<[f64; 2]>> = polygon
        .rings()
        .map(|ring| ring.iter().map(|p| [p.x, p.y]).collect())
        .collect();
    json!({ "type": "Polygon", "coordinates": rings })
}

/// One feature per polygon: input properties, then id/count/statistics.
fn feature_collection(set: &PolygonSet, records: &[StatisticsRecord]) -> Value {
    let features: Vec<Value> = set
        .polygons
        .iter()
        .zip(&set.properties)
        .zip(records)
        .map(|((polygon, props), record)| {
            let mut properties = props.clone();
            properties.extend(record.to_properties());
            json!({
                "type": "Feature",
                "geometry": polygon_geometry(polygon),
                "properties": properties,
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

// ── Runs ─────────────────────────────────────────────────────────────────────

fn timed<T>(label: &str, f: impl FnOnce() -> T) -> (T, f64) {
    let start = Instant::now();
    let out = f();
    let secs = start.elapsed().as_secs_f64();
    info!(run = label, seconds = secs, "finished");
    (out, secs)
}

fn run(raster: &RasterGrid, polygons: &[Polygon], cfg: &RunConfig, compare: bool) -> Result<Vec<StatisticsRecord>> {
    let reg = registry();
    if compare {
        let (serial, t_serial) = timed("serial", || compute_stats(raster, polygons, &cfg.stats, &reg));
        let serial = serial?;
        let (parallel, t_parallel) = timed("parallel", || {
            compute_stats_parallel(raster, polygons, &cfg.stats, &reg, &cfg.parallel)
        });
        let parallel = parallel?;
        if serial.len() != parallel.len() || serial.iter().zip(&parallel).any(|(a, b)| !a.bit_identical(b)) {
            bail!("serial and parallel results differ");
        }
        info!(
            workers = cfg.parallel.effective_workers(),
            speedup = t_serial / t_parallel.max(f64::EPSILON),
            "serial and parallel results are identical"
        );
        return Ok(parallel);
    }
    if cfg.is_serial() {
        let (out, _) = timed("serial", || compute_stats(raster, polygons, &cfg.stats, &reg));
        Ok(out?)
    } else {
        let (out, _) = timed("parallel", || {
            compute_stats_parallel(raster, polygons, &cfg.stats, &reg, &cfg.parallel)
        });
        Ok(out?)
    }
}

// ── main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let cfg = RunConfig::from_args(&args)?;
    info!(stats = ?cfg.stats.stats, inclusion = ?cfg.stats.inclusion, workers = cfg.parallel.workers, "configuration");

    let raster = load_raster(&args.raster)?;
    info!(width = raster.width, height = raster.height, nodata = ?raster.nodata, "raster loaded");
    let set = load_polygons(&args.polygons)?;
    info!(polygons = set.polygons.len(), "polygons loaded");

    let records = run(&raster, &set.polygons, &cfg, args.compare)?;
    if records.len() != set.polygons.len() {
        bail!("{} records for {} polygons", records.len(), set.polygons.len());
    }

    let empty = records.iter().filter(|r| r.is_empty()).count();
    let cells: usize = records.iter().map(|r| r.count).sum();
    info!(records = records.len(), empty, cells, "zonal statistics complete");

    if let Some(out) = &args.output {
        if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let collection = feature_collection(&set, &records);
        fs::write(out, serde_json::to_string(&collection)?).with_context(|| format!("writing {}", out.display()))?;
        info!(path = %out.display(), "wrote feature collection");
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;
    use tiff::encoder::{colortype, TiffEncoder};

    const SQUARES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "corner"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,3],[1,3],[1,4],[0,4],[0,3]]]}},
            {"type": "Feature", "properties": null,
             "geometry": {"type": "Polygon", "coordinates": [
                [[0,0,5],[4,0,5],[4,4,5],[0,4,5],[0,0,5]],
                [[1,1],[3,1],[3,3],[1,3],[1,1]]]}}
        ]
    }"#;

    fn sixteen() -> RasterGrid {
        let values = (1..=16).map(f64::from).collect();
        RasterGrid::new(4, 4, values, Affine::from_gdal(0.0, 1.0, 0.0, 4.0, 0.0, -1.0), Some(0.0)).unwrap()
    }

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["zonal_stats", "--raster", "grid.tif", "--polygons", "circles.geojson"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn geojson_polygons_get_index_ids_and_holes() {
        let set = polygons_from_geojson(SQUARES).unwrap();
        assert_eq!(set.polygons.len(), 2);
        assert_eq!(set.polygons[0].id, 0);
        assert_eq!(set.polygons[1].id, 1);
        assert_eq!(set.polygons[1].holes.len(), 1);
        assert_eq!(set.polygons[1].exterior[1], Point::new(4.0, 0.0));
        assert_eq!(set.properties[0]["name"], json!("corner"));
        assert!(set.properties[1].is_empty());
    }

    #[test]
    fn non_polygon_geometry_is_rejected() {
        let text = r#"{"features": [{"geometry": {"type": "Point", "coordinates": [1, 2]}}]}"#;
        let err = polygons_from_geojson(text).unwrap_err();
        assert!(err.to_string().contains("expected Polygon"), "{err}");
    }

    #[test]
    fn output_features_carry_properties_and_stats() {
        let set = polygons_from_geojson(SQUARES).unwrap();
        let cfg = RunConfig::benchmark();
        let records = run(&sixteen(), &set.polygons, &cfg, false).unwrap();
        let fc = feature_collection(&set, &records);
        let features = fc["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);

        let corner = &features[0]["properties"];
        assert_eq!(corner["name"], json!("corner"));
        assert_eq!(corner["count"], json!(1));
        assert_eq!(corner["min"], json!(1.0));
        assert_eq!(corner["model"], json!(0.0));

        // Ring of 12 cells around the 2×2 hole.
        let ring = &features[1]["properties"];
        assert_eq!(ring["id"], json!(1));
        assert_eq!(ring["count"], json!(12));
        assert_eq!(features[1]["geometry"]["coordinates"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn compare_mode_checks_agreement() {
        let set = polygons_from_geojson(SQUARES).unwrap();
        let cfg = RunConfig { parallel: ParallelConfig::with_workers(2), ..RunConfig::benchmark() };
        let records = run(&sixteen(), &set.polygons, &cfg, true).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = RunConfig::from_args(&args(&[])).unwrap();
        assert_eq!(cfg, RunConfig::benchmark());
        assert!(!cfg.is_serial());

        let cfg = RunConfig::from_args(&args(&[
            "--stats", "min,percentile_90", "--all-touched", "--nodata", "-9999", "--workers", "1",
        ]))
        .unwrap();
        assert_eq!(cfg.stats.stats, vec!["min", "percentile_90"]);
        assert_eq!(cfg.stats.inclusion, CellInclusion::AllTouched);
        assert_eq!(cfg.stats.nodata_override, Some(-9999.0));
        assert!(cfg.is_serial());
    }

    #[test]
    fn raster_json_is_validated() {
        let good = serde_json::to_string(&sixteen()).unwrap();
        assert_eq!(raster_from_json(&good).unwrap().values.len(), 16);

        let bad = r#"{"width": 2, "height": 2, "values": [1.0],
                      "transform": {"a": 1.0, "b": 0.0, "c": 0.0, "d": 0.0, "e": -1.0, "f": 0.0}}"#;
        assert!(raster_from_json(bad).is_err());
    }

    #[test]
    fn geotiff_georeference_and_nodata() {
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, -9999.0, 5.0, 6.0];
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            let mut image = encoder.new_image::<colortype::Gray32Float>(3, 2).unwrap();
            image.encoder().write_tag(Tag::ModelPixelScaleTag, &[0.5f64, 0.25, 0.0][..]).unwrap();
            image
                .encoder()
                .write_tag(Tag::ModelTiepointTag, &[0.0f64, 0.0, 0.0, -75.0, 5.0, 0.0][..])
                .unwrap();
            image.encoder().write_tag(Tag::GdalNodata, "-9999").unwrap();
            image.write_data(&data).unwrap();
        }
        buf.set_position(0);

        let raster = read_geotiff(buf).unwrap();
        assert_eq!((raster.width, raster.height), (3, 2));
        assert_eq!(raster.nodata, Some(-9999.0));
        assert_eq!(raster.get(1, 0), -9999.0);
        assert!(!raster.is_valid_value(raster.get(1, 0)));
        let (x, y) = raster.cell_center(2, 1);
        assert_relative_eq!(x, -75.0 + 2.5 * 0.5);
        assert_relative_eq!(y, 5.0 - 1.5 * 0.25);
    }
}
