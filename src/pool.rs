use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

/// Fixed-size set of download workers. Each batch is scattered over at most
/// `size` threads pulling from one queue; results come back in completion
/// order and `run_batch` returns once every task has resolved.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `work` on every task. `on_result` is called on the calling thread
    /// as each task finishes.
    pub fn run_batch<T, O, W, F>(&self, tasks: Vec<T>, work: W, mut on_result: F)
    where
        T: Send,
        O: Send,
        W: Fn(&T) -> O + Sync,
        F: FnMut(T, O),
    {
        if tasks.is_empty() {
            return;
        }
        let workers = self.size.min(tasks.len());
        let queue = Mutex::new(VecDeque::from(tasks));
        let (tx, rx) = mpsc::channel::<(T, O)>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let work = &work;
                scope.spawn(move || {
                    loop {
                        let next = match queue.lock() {
                            Ok(mut guard) => guard.pop_front(),
                            Err(poisoned) => poisoned.into_inner().pop_front(),
                        };
                        let Some(task) = next else {
                            break;
                        };
                        let outcome = work(&task);
                        if tx.send((task, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (task, outcome) in rx {
                on_result(task, outcome);
            }
        });
    }
}
