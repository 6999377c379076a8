//! Mandelbrot set job definition: the coordinator and worker state and
//! callbacks that plug into `farflung::Coordinator` / `farflung::Worker`.
//!
//! Each unit of work is one scanline. A worker receives a row index,
//! escapes every pixel on that row, and returns the iteration counts.
//! The coordinator accumulates completed rows into one image buffer and
//! writes it out as a PPM once every row is done.

use farflung::coordinator::CoordinatorCallbacks;
use farflung::worker::WorkerCallbacks;
use farflung::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MandelInfo {
    pub c_start_re: f64,
    pub c_start_im: f64,
    pub c_end_re: f64,
    pub c_end_im: f64,
    pub width: usize,
    pub height: usize,
    pub re_step: f64,
    pub im_step: f64,
    pub max_iteration: u32,
}

impl MandelInfo {
    pub fn new(
        c_start: (f64, f64),
        c_end: (f64, f64),
        width: usize,
        height: usize,
        max_iteration: u32,
    ) -> Self {
        let re_step = (c_end.0 - c_start.0) / width as f64;
        let im_step = (c_end.1 - c_start.1) / height as f64;
        MandelInfo {
            c_start_re: c_start.0,
            c_start_im: c_start.1,
            c_end_re: c_end.0,
            c_end_im: c_end.1,
            width,
            height,
            re_step,
            im_step,
            max_iteration,
        }
    }
}

impl Default for MandelInfo {
    fn default() -> Self {
        MandelInfo::new((-2.0, -1.5), (1.0, 1.5), 1024, 1024, 2048)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Empty,
    Pending,
    Done,
}

/// Shared coordinator state: the image buffer, the per-row status table,
/// and which worker currently owns which row.
pub struct MandelServerState {
    pub mandel_info: MandelInfo,
    pub node_id_row: HashMap<NodeId, usize>,
    pub mandel_image: Vec<u32>,
    pub processed_rows: Vec<RowStatus>,
}

impl MandelServerState {
    pub fn new(mandel_info: MandelInfo) -> Self {
        let size = mandel_info.width * mandel_info.height;
        let height = mandel_info.height;
        MandelServerState {
            mandel_image: vec![0; size],
            processed_rows: vec![RowStatus::Empty; height],
            node_id_row: HashMap::new(),
            mandel_info,
        }
    }

    pub fn save_ppm(&self, path: &std::path::Path) -> std::io::Result<()> {
        use std::io::Write;

        let width = self.mandel_info.width;
        let height = self.mandel_info.height;
        let limit = self.mandel_info.max_iteration;
        let half_limit = limit / 2;

        let mut f = std::io::BufWriter::new(std::fs::File::create(path)?);
        writeln!(f, "P3")?;
        writeln!(f, "{width} {height}")?;
        writeln!(f, "255")?;

        for y in 0..height {
            for x in 0..width {
                let val = self.mandel_image[(y * width) + x];
                if val < limit {
                    if val <= half_limit {
                        let color_value = (val * 255) / half_limit;
                        write!(f, "255 0 {color_value} ")?;
                    } else {
                        let color_value = ((limit - val) * 255) / half_limit;
                        write!(f, "{color_value} 0 255 ")?;
                    }
                } else {
                    write!(f, "0 0 0 ")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub fn coordinator_callbacks(
) -> CoordinatorCallbacks<MandelServerState, MandelInfo, usize, Vec<u32>> {
    CoordinatorCallbacks {
        get_init_data: Arc::new(|state, _node_id| state.mandel_info.clone()),
        get_new_data: Arc::new(|state, node_id| {
            let row = state
                .processed_rows
                .iter()
                .position(|status| *status == RowStatus::Empty)?;
            state.node_id_row.insert(node_id, row);
            state.processed_rows[row] = RowStatus::Pending;
            Some(row)
        }),
        process_result: Arc::new(|state, node_id, result| {
            let Some(row) = state.node_id_row.remove(&node_id) else {
                tracing::warn!(%node_id, "result from a worker with no assigned row");
                return;
            };
            let width = state.mandel_info.width;
            let offset = row * width;
            state.mandel_image[offset..offset + width].copy_from_slice(&result);
            state.processed_rows[row] = RowStatus::Done;
        }),
        // Fixed from the original: must test each row's own status, not
        // the `RowStatus::Done` value itself.
        is_job_done: Arc::new(|state| {
            state
                .processed_rows
                .iter()
                .all(|status| *status == RowStatus::Done)
        }),
        save_data: Arc::new(|state| {
            let path = std::path::Path::new("mandel_image.ppm");
            if let Err(error) = state.save_ppm(path) {
                tracing::error!(%error, "failed to write mandel_image.ppm");
            } else {
                tracing::info!(path = %path.display(), "wrote image");
            }
        }),
        on_timeout: Arc::new(|state, node_id| {
            if let Some(row) = state.node_id_row.remove(&node_id) {
                state.processed_rows[row] = RowStatus::Empty;
            }
        }),
    }
}

#[derive(Default)]
pub struct MandelNodeState {
    pub mandel_info: Option<MandelInfo>,
}

pub fn worker_callbacks() -> WorkerCallbacks<MandelNodeState, MandelInfo, usize, Vec<u32>> {
    WorkerCallbacks {
        init: Arc::new(|state, data| {
            state.mandel_info = Some(data);
        }),
        process_data: Arc::new(|state, row| {
            let info = state
                .mandel_info
                .as_ref()
                .expect("process_data called before init");
            let mut line = vec![0u32; info.width];
            let c_y = info.c_start_im + (info.im_step * row as f64);

            for (x, slot) in line.iter_mut().enumerate() {
                let c_x = info.c_start_re + (info.re_step * x as f64);
                let (mut zr, mut zi) = (c_x, c_y);
                let mut iter = 0u32;
                while (zr * zr + zi * zi) < 4.0 && iter < info.max_iteration {
                    let next_zr = c_x + (zr * zr - zi * zi);
                    let next_zi = c_y + (2.0 * zr * zi);
                    zr = next_zr;
                    zi = next_zi;
                    iter += 1;
                }
                *slot = iter;
            }
            line
        }),
    }
}
