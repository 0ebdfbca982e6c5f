use std::{num::NonZeroUsize, thread};

use crossbeam_channel::unbounded;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Worker thread count: `"auto"` for the number of cores, `0` or `1` to evaluate sequentially.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(from = "ThreadsRepr", into = "ThreadsRepr")]
pub enum Threads {
    #[default]
    Auto,

    Count(usize),
}

#[derive(Copy, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum ThreadsRepr {
    Count(usize),
    Keyword(ThreadsKeyword),
}

#[derive(Copy, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum ThreadsKeyword {
    Auto,
}

impl From<ThreadsRepr> for Threads {
    fn from(repr: ThreadsRepr) -> Self {
        match repr {
            ThreadsRepr::Count(count) => Self::Count(count),
            ThreadsRepr::Keyword(ThreadsKeyword::Auto) => Self::Auto,
        }
    }
}

impl From<Threads> for ThreadsRepr {
    fn from(threads: Threads) -> Self {
        match threads {
            Threads::Auto => Self::Keyword(ThreadsKeyword::Auto),
            Threads::Count(count) => Self::Count(count),
        }
    }
}

/// Bounded pool of scoped workers fed from a shared queue.
#[derive(Copy, Clone, Debug)]
pub struct Pool {
    n_threads: usize,
}

impl Pool {
    #[must_use]
    pub fn new(threads: Threads) -> Self {
        let n_threads = match threads {
            Threads::Auto => thread::available_parallelism().map_or(1, NonZeroUsize::get),
            Threads::Count(count) => count.max(1),
        };
        Self { n_threads }
    }

    #[must_use]
    pub const fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Apply `f` to every item, returning the results in the item order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        let n_workers = self.n_threads.min(items.len());
        if n_workers <= 1 {
            return items.into_iter().map(f).collect();
        }

        let (job_sender, job_receiver) = unbounded();
        for job in items.into_iter().enumerate() {
            // The receiver is alive, so this cannot fail:
            let _ = job_sender.send(job);
        }
        drop(job_sender);

        let (result_sender, result_receiver) = unbounded();
        thread::scope(|scope| {
            for _ in 0..n_workers {
                let (job_receiver, result_sender) = (job_receiver.clone(), result_sender.clone());
                let f = &f;
                scope.spawn(move || {
                    for (index, item) in job_receiver {
                        if result_sender.send((index, f(item))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_sender);

        result_receiver
            .into_iter()
            .sorted_unstable_by_key(|(index, _)| *index)
            .map(|(_, result)| result)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Config {
        threads: Threads,
    }

    #[test]
    fn test_parse_threads() {
        let config: Config = toml::from_str(r#"threads = "auto""#).unwrap();
        assert_eq!(config.threads, Threads::Auto);
        let config: Config = toml::from_str("threads = 4").unwrap();
        assert_eq!(config.threads, Threads::Count(4));
        assert!(toml::from_str::<Config>(r#"threads = "many""#).is_err());
    }

    #[test]
    fn test_disabled_is_sequential() {
        assert_eq!(Pool::new(Threads::Count(0)).n_threads(), 1);
    }

    #[test]
    fn test_map_preserves_order() {
        let items = (0..100).collect_vec();
        let expected = items.iter().map(|item| item * item).collect_vec();
        for threads in [Threads::Count(1), Threads::Count(4), Threads::Auto] {
            assert_eq!(Pool::new(threads).map(items.clone(), |item| item * item), expected);
        }
    }
}
