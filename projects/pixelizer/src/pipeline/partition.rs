use crate::pipeline::types::FrameRange;

/// Upper bound on parallel workers per job. Part layout depends on it.
pub const MAX_WORKERS: usize = 4;

/// `min(max_workers, available)`, never zero.
pub fn worker_count(max_workers: usize, available: usize) -> usize {
    max_workers.min(available).max(1)
}

/// Host parallelism as reported by the OS, 1 when unknown.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Split `[0, frame_count)` into `workers` contiguous ranges.
///
/// Every range has `frame_count / workers` frames except the last, which
/// also takes the remainder.
pub fn partition_frames(frame_count: usize, workers: usize) -> Vec<FrameRange> {
    let workers = workers.max(1);
    let frame_shift = frame_count / workers;

    (0..workers)
        .map(|i| {
            let start = i * frame_shift;
            let end = if i == workers - 1 {
                frame_count
            } else {
                start + frame_shift
            };
            FrameRange::new(start, end)
        })
        .collect()
}
