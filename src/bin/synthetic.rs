use csv::ReaderBuilder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusty_forest::data::dataset::{Dataset, GridSource};
use rusty_forest::data::grid::{Grid, GridValue, ReferenceGrid, SampleGrid};
use rusty_forest::data::sampler::{BootstrapSampler, Sampler, Sampling};
use rusty_forest::forests::{Forest, ForestParams};
use rusty_forest::ForestError;
use rusty_forest::metrics::detection::{best_threshold, DetectionCounts};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reads a headerless CSV file with one row per frame.
fn read_grid<T>(file_path: &Path) -> Result<Grid<T>, Box<dyn Error>>
where
    T: GridValue + FromStr,
    <T as FromStr>::Err: Error + 'static,
{
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .from_path(file_path)?;
    let mut values = Vec::new();
    let mut frames = 0;
    let mut bins = None;

    for result in reader.records() {
        let record = result?;
        if *bins.get_or_insert(record.len()) != record.len() {
            return Err(format!("frame {frames} has {} bins", record.len()).into());
        }
        for field in record.iter() {
            values.push(field.trim().parse::<T>()?);
        }
        frames += 1;
    }
    Ok(Grid::from_frames(frames, bins.unwrap_or(0), &values)?)
}

/// Sample and reference grids stored as CSV files, read when the dataset is first loaded.
struct CsvSource {
    name: String,
    sample: PathBuf,
    reference: PathBuf,
}

impl GridSource for CsvSource {
    fn load(&self) -> Result<(SampleGrid, ReferenceGrid), ForestError> {
        let read_error = |path: &Path, error: Box<dyn Error>| {
            ForestError::Load(format!("{}: {error}", path.display()))
        };
        let sample = read_grid::<f32>(&self.sample).map_err(|e| read_error(&self.sample, e))?;
        let reference =
            read_grid::<u8>(&self.reference).map_err(|e| read_error(&self.reference, e))?;
        Ok((sample, reference))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Spectrogram-like grid with broadband onsets at random frames.
fn synthetic_dataset(
    name: &str,
    frames: usize,
    bins: usize,
    rng: &mut StdRng,
) -> Result<Dataset, ForestError> {
    let mut sample = SampleGrid::zeros(frames, bins);
    let mut reference = ReferenceGrid::zeros(frames, bins);
    let mut x = rng.gen_range(2..8);
    while x < frames {
        for y in 0..bins {
            reference[(x, y)] = 1;
            for decay in 0..4 {
                if x + decay < frames {
                    sample[(x + decay, y)] += 0.8 / (decay + 1) as f32;
                }
            }
        }
        x += rng.gen_range(6..20);
    }
    for x in 0..frames {
        for y in 0..bins {
            let value = sample[(x, y)] + rng.gen_range(0.0f32..0.15);
            sample[(x, y)] = value.min(1.0);
        }
    }
    Dataset::from_grids(name, sample, reference)
}

struct Args {
    params: Option<PathBuf>,
    csv: Option<(PathBuf, PathBuf)>,
    save: Option<PathBuf>,
}

fn parse_args() -> Result<Args, Box<dyn Error>> {
    let mut args = Args {
        params: None,
        csv: None,
        save: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--params" => args.params = Some(iter.next().ok_or("--params needs a path")?.into()),
            "--save" => args.save = Some(iter.next().ok_or("--save needs a prefix")?.into()),
            "--csv" => {
                let sample = iter.next().ok_or("--csv needs a sample grid")?;
                let reference = iter.next().ok_or("--csv needs a reference grid")?;
                args.csv = Some((sample.into(), reference.into()));
            }
            other => return Err(format!("unknown argument {other}").into()),
        }
    }
    Ok(args)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let params = match &args.params {
        Some(path) => ForestParams::from_json_str(&std::fs::read_to_string(path)?)?,
        None => {
            let mut params = ForestParams::new();
            params.set_seed(Some(42));
            params.set_poll_interval_ms(500)?;
            params
        }
    };

    let mut rng = StdRng::seed_from_u64(params.seed.unwrap_or(0));
    let pool = match &args.csv {
        Some((sample, reference)) => vec![Dataset::new(Arc::new(CsvSource {
            name: "csv".into(),
            sample: sample.clone(),
            reference: reference.clone(),
        }))],
        None => (0..10)
            .map(|i| synthetic_dataset(&format!("synthetic-{i}"), 400, 24, &mut rng))
            .collect::<Result<Vec<_>, _>>()?,
    };

    let (train, test) = if pool.len() > 1 {
        let mut parts = Sampler::new(pool).split(5, params.seed)?;
        let test = parts.pop().unwrap_or_default();
        let train = parts
            .into_iter()
            .flat_map(|part| part.datasets().to_vec())
            .collect::<Vec<_>>();
        (BootstrapSampler::new(train), test)
    } else {
        (BootstrapSampler::new(pool.clone()), Sampler::new(pool))
    };
    info!(
        train = train.pool_size(),
        test = test.pool_size(),
        "Prepared datasets"
    );

    let mut forest = Forest::with_standard_features(params)?;
    forest.grow(&train)?;

    let mut total = DetectionCounts::default();
    for dataset in test.datasets() {
        let grids = dataset.load()?;
        let probabilities = forest.classify(&grids.sample)?;
        let best = best_threshold(&probabilities, &grids.reference, 1, 20)?;
        info!(
            dataset = dataset.name(),
            threshold = best.threshold,
            f_measure = best.f_measure,
            detection_rate = best.counts.detection_rate(),
            false_detection_rate = best.counts.false_detection_rate(),
            "Evaluated dataset"
        );
        total.merge(&DetectionCounts::count(
            &probabilities,
            &grids.reference,
            1,
            0.5,
        )?);
    }
    info!(
        f_measure = total.f_measure(),
        detection_rate = total.detection_rate(),
        false_detection_rate = total.false_detection_rate(),
        "Test pool at threshold 0.5"
    );

    if let Some(prefix) = &args.save {
        forest.save(prefix)?;
    }
    Ok(())
}
