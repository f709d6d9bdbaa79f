use std::io;
use std::thread::{self, JoinHandle};

/// A unit of background work that owns its own loop.
pub trait Task: Send + 'static {
    fn run(&mut self);
}

/// Launches any `Task` on a new named thread.
pub fn spawn<T: Task>(name: &str, mut task: T) -> io::Result<JoinHandle<()>> {
    log::debug!("Spawning thread {:?}", name);
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || task.run())
}
