//! Synchronous-read tile buffer
//!
//! Only the latency contract of the on-chip buffers is modelled: a read
//! request issued on one edge makes the whole tile visible on the read port
//! `read_latency` edges later.

#[derive(Debug, Clone)]
pub struct TileBuffer<T> {
    data: Vec<T>,
    read_latency: u32,
    countdown: u32,
    rdata: Option<Vec<T>>,
}

impl<T: Copy + Default> TileBuffer<T> {
    pub fn new(len: usize, read_latency: u32) -> Self {
        Self {
            data: vec![T::default(); len],
            read_latency,
            countdown: 0,
            rdata: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Host-side write of the tile contents; invalidates the read port
    pub fn fill(&mut self, values: &[T]) {
        self.data.copy_from_slice(values);
        self.rdata = None;
    }

    /// Issue a read request on the current edge
    pub fn request(&mut self) {
        self.countdown = self.read_latency;
        self.rdata = None;
    }

    pub fn tick(&mut self) {
        if self.countdown > 0 {
            self.countdown -= 1;
            if self.countdown == 0 {
                self.rdata = Some(self.data.clone());
            }
        }
    }

    /// Read port contents, `None` until the latency has elapsed
    pub fn read_port(&self) -> Option<&[T]> {
        self.rdata.as_deref()
    }

    pub fn contents(&self) -> &[T] {
        &self.data
    }
}
