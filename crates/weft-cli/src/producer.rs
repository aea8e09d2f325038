//! Simulated producer: random tasks for exercising the workers.

use std::ops::RangeInclusive;

use rand::Rng;
use rand::distributions::Alphanumeric;
use weft_core::domain::NewTask;

pub const DEFAULT_NUM_TASKS: usize = 30;

/// Seconds of simulated work per task.
pub const PROCESSING_TIME: RangeInclusive<u32> = 1..=5;

const DATA_LEN: usize = 10;

/// One task: `{task_number, data, processing_time}` with the same
/// `processing_time` mirrored into the column.
pub fn random_task<R: Rng + ?Sized>(rng: &mut R, task_number: usize) -> NewTask {
    let data: String = (0..DATA_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect();
    let processing_time = rng.gen_range(PROCESSING_TIME);

    NewTask::new(
        serde_json::json!({
            "task_number": task_number,
            "data": format!("Task data {data}"),
            "processing_time": processing_time,
        }),
        processing_time,
    )
}

/// Tasks numbered `1..=n`.
pub fn random_batch<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<NewTask> {
    (1..=n).map(|task_number| random_task(rng, task_number)).collect()
}
