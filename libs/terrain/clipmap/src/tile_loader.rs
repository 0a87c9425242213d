// This file is part of Nitrogen.
//
// Nitrogen is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Nitrogen is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Nitrogen.  If not, see <http://www.gnu.org/licenses/>.
// Tile loads leave the main thread through a request queue drained by one worker, and come
// back through a completion queue the main thread drains once per frame. Nothing else is
// shared between the two: the worker only ever sees the backend, which is immutable.
use anyhow::{anyhow, Result};
use message_queue::{MessagePoster, MessageQueue};
use raster::{RasterBackend, RasterTileIdentifier, Texel, TileLoadError, TileTexels};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

/// Handle the main thread keeps for a load it has asked for.
#[derive(Clone, Debug)]
pub struct InFlightRequest {
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl InFlightRequest {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The worker will skip the request if it has not started it yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

struct TileRequest {
    tile: RasterTileIdentifier,
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

pub struct TileCompletion<T: Texel> {
    pub tile: RasterTileIdentifier,
    pub generation: u64,
    pub result: Result<TileTexels<T>, TileLoadError>,
}

fn load_tile<T: Texel>(
    backend: &dyn RasterBackend<Texel = T>,
    tile: &RasterTileIdentifier,
) -> Result<TileTexels<T>, TileLoadError> {
    let level = backend.levels().get(tile.level).ok_or_else(|| {
        TileLoadError::permanent(anyhow!("{} has no level {}", backend.name(), tile.level))
    })?;
    if !level.contains_tile(tile) {
        return Err(TileLoadError::permanent(anyhow!(
            "tile {tile} is outside of {}",
            backend.name()
        )));
    }
    backend.load_tile(level, tile)
}

struct Worker {
    requests: MessagePoster<TileRequest>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

pub struct TileLoader<T: Texel> {
    backend: Arc<dyn RasterBackend<Texel = T>>,
    completions: MessageQueue<TileCompletion<T>>,
    worker: Option<Worker>,
    next_generation: u64,
}

impl<T: Texel> fmt::Debug for TileLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TileLoader")
            .field("backend", &self.backend.name())
            .field("background", &self.worker.is_some())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

impl<T: Texel> TileLoader<T> {
    /// Loads on a dedicated, named worker thread.
    pub fn background(backend: Arc<dyn RasterBackend<Texel = T>>) -> Result<Self> {
        let completions = MessageQueue::new();
        let requests = MessageQueue::<TileRequest>::new();
        let poster = requests.poster();
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_backend = backend.clone();
        let worker_completions = completions.poster();
        let worker_shutdown = shutdown.clone();
        let handle = thread::Builder::new()
            .name(format!("tile-loader-{}", backend.name()))
            .spawn(move || {
                requests.run(|request: TileRequest| {
                    if worker_shutdown.load(Ordering::Relaxed)
                        || request.cancelled.load(Ordering::Relaxed)
                    {
                        return;
                    }
                    let result = load_tile(worker_backend.as_ref(), &request.tile);
                    worker_completions.post(TileCompletion {
                        tile: request.tile,
                        generation: request.generation,
                        result,
                    });
                });
            })?;

        Ok(Self {
            backend,
            completions,
            worker: Some(Worker {
                requests: poster,
                shutdown,
                handle: Some(handle),
            }),
            next_generation: 1,
        })
    }

    /// Loads on the calling thread, inside `request`. Results still arrive through `drain`.
    pub fn inline(backend: Arc<dyn RasterBackend<Texel = T>>) -> Self {
        Self {
            backend,
            completions: MessageQueue::new(),
            worker: None,
            next_generation: 1,
        }
    }

    pub fn is_background(&self) -> bool {
        self.worker.is_some()
    }

    pub fn request(&mut self, tile: RasterTileIdentifier) -> InFlightRequest {
        let generation = self.next_generation;
        self.next_generation += 1;
        let cancelled = Arc::new(AtomicBool::new(false));
        let request = TileRequest {
            tile,
            generation,
            cancelled: cancelled.clone(),
        };
        match &self.worker {
            Some(worker) => {
                if !worker.requests.post(request) {
                    log::warn!("tile loader for {} has stopped", self.backend.name());
                }
            }
            None => self.completions.post(TileCompletion {
                tile,
                generation,
                result: load_tile(self.backend.as_ref(), &tile),
            }),
        }
        InFlightRequest {
            generation,
            cancelled,
        }
    }

    /// Hand every completion that has arrived to `handler`, without blocking.
    pub fn drain<F>(&self, handler: F) -> usize
    where
        F: FnMut(TileCompletion<T>),
    {
        self.completions.process_queue(handler)
    }

    /// As drain, but wait up to `timeout` for the first completion.
    pub fn drain_timeout<F>(&self, timeout: std::time::Duration, handler: F) -> usize
    where
        F: FnMut(TileCompletion<T>),
    {
        self.completions.process_queue_timeout(timeout, handler)
    }
}

impl<T: Texel> Drop for TileLoader<T> {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown.store(true, Ordering::Relaxed);
            worker.requests.terminate();
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    log::warn!("tile loader for {} panicked", self.backend.name());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use geodesy::GeodeticExtent;
    use raster::{ProceduralBackend, RasterLevel};
    use std::time::Duration;

    fn backend() -> Result<Arc<dyn RasterBackend<Texel = f32>>> {
        let levels = RasterLevel::pyramid(GeodeticExtent::whole_globe(), 2, 9, 5, 4)?;
        Ok(Arc::new(ProceduralBackend::new("test", levels, |lon, _| {
            lon as f32
        })?))
    }

    #[test]
    fn test_inline_delivers_through_queue() -> Result<()> {
        let mut loader = TileLoader::inline(backend()?);
        let first = loader.request(RasterTileIdentifier::new(0, 0, 0));
        let second = loader.request(RasterTileIdentifier::new(1, 9, 0));
        assert!(second.generation() > first.generation());
        let mut results = Vec::new();
        assert_eq!(loader.drain(|c| results.push(c)), 2);
        assert!(results[0].result.is_ok());
        assert!(results[1].result.as_ref().err().map(|e| e.is_permanent()).unwrap_or(false));
        assert_eq!(loader.drain(|_| {}), 0);
        Ok(())
    }

    #[test]
    fn test_background_round_trip() -> Result<()> {
        let mut loader = TileLoader::background(backend()?)?;
        assert!(loader.is_background());
        let tiles = [
            RasterTileIdentifier::new(0, 0, 0),
            RasterTileIdentifier::new(0, 1, 0),
            RasterTileIdentifier::new(1, 2, 1),
        ];
        for tile in tiles {
            loader.request(tile);
        }
        let mut arrived = Vec::new();
        for _ in 0..100 {
            loader.drain_timeout(Duration::from_millis(50), |c| arrived.push(c.tile));
            if arrived.len() == tiles.len() {
                break;
            }
        }
        assert_eq!(arrived, tiles);
        Ok(())
    }

    #[test]
    fn test_inline_cancel_still_delivers() -> Result<()> {
        let mut loader = TileLoader::inline(backend()?);
        let request = loader.request(RasterTileIdentifier::new(0, 0, 0));
        request.cancel();
        // Inline loads complete immediately; the updater discards the result by generation.
        assert_eq!(loader.drain(|_| {}), 1);
        Ok(())
    }

    #[test]
    fn test_cancelled_before_start_is_skipped() -> Result<()> {
        let levels = RasterLevel::pyramid(GeodeticExtent::whole_globe(), 2, 9, 5, 4)?;
        let slow = ProceduralBackend::new("slow", levels, |lon, _| {
            thread::sleep(Duration::from_millis(2));
            lon as f32
        })?;
        let mut loader = TileLoader::<f32>::background(Arc::new(slow))?;
        let first = RasterTileIdentifier::new(0, 0, 0);
        let last = RasterTileIdentifier::new(1, 2, 1);
        loader.request(first);
        // The worker is still busy with the first tile when this is cancelled.
        loader.request(RasterTileIdentifier::new(0, 1, 0)).cancel();
        loader.request(last);

        let mut arrived = Vec::new();
        for _ in 0..100 {
            loader.drain_timeout(Duration::from_millis(50), |c| arrived.push(c.tile));
            if arrived.last() == Some(&last) {
                break;
            }
        }
        assert_eq!(arrived, [first, last]);
        Ok(())
    }
}
