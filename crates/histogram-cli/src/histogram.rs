use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub min: f64,
    pub max: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistogramError {
    #[error("bucket count must be at least 1")]
    NoBuckets,
    #[error(
        "need at least 2 distinct temperature samples to bucket (got {distinct}); \
         the forecast APIs were likely exhausted, try again tomorrow"
    )]
    InsufficientVariance { distinct: usize },
}

/// Partitions the observed range into `bucket_count` equal-width
/// contiguous intervals. Each sample lands in `[lower, upper)`; the
/// last bucket also takes the maximum.
pub fn build_histogram(samples: &[f64], bucket_count: usize) -> Result<Vec<Bucket>, HistogramError> {
    if bucket_count == 0 {
        return Err(HistogramError::NoBuckets);
    }

    let distinct = distinct_count(samples);
    if distinct < 2 {
        return Err(HistogramError::InsufficientVariance { distinct });
    }

    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / bucket_count as f64;

    let mut counts = vec![0u64; bucket_count];
    for sample in samples {
        let index = (((sample - min) / width) as usize).min(bucket_count - 1);
        counts[index] += 1;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(index, count)| Bucket {
            min: min + width * index as f64,
            max: min + width * (index + 1) as f64,
            count,
        })
        .collect())
}

/// Tab-separated frequency table. The first row reports `0` as its
/// lower bound regardless of the true minimum (legacy output format).
pub fn render_tsv(buckets: &[Bucket]) -> String {
    let mut out = String::from("bucketMin\tbucketMax\tCount\n");
    for (index, bucket) in buckets.iter().enumerate() {
        if index == 0 {
            out.push_str(&format!("0\t{}\t{}\n", bucket.max, bucket.count));
        } else {
            out.push_str(&format!("{}\t{}\t{}\n", bucket.min, bucket.max, bucket.count));
        }
    }
    out
}

fn distinct_count(samples: &[f64]) -> usize {
    let mut seen: Vec<f64> = Vec::new();
    for sample in samples {
        if !seen.contains(sample) {
            seen.push(*sample);
        }
    }
    seen.len()
}
