use std::sync::Arc;

use rand::Rng;
use rand::seq::index;

use crate::error::HarnessError;

/// The candidate URLs for a run, fixed once constructed.
///
/// Clones share the same storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPool {
    urls: Arc<[String]>,
}

impl UrlPool {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Draw `size` distinct URLs in random order.
    ///
    /// ```
    /// use fanout_harness::UrlPool;
    /// use rand::SeedableRng;
    /// use rand::rngs::StdRng;
    ///
    /// let pool = UrlPool::new(["a", "b", "c", "d"]);
    /// let mut rng = StdRng::seed_from_u64(7);
    /// let batch = pool.sample(3, &mut rng).unwrap();
    /// assert_eq!(batch.len(), 3);
    /// assert!(pool.sample(5, &mut rng).is_err());
    /// ```
    pub fn sample<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Result<Batch, HarnessError> {
        self.check_size(size)?;
        let urls = index::sample(rng, self.urls.len(), size)
            .into_iter()
            .map(|i| self.urls[i].clone())
            .collect();
        Ok(Batch { urls })
    }

    pub(crate) fn check_size(&self, size: usize) -> Result<(), HarnessError> {
        if size == 0 || size > self.urls.len() {
            return Err(HarnessError::BatchSize {
                size,
                pool: self.urls.len(),
            });
        }
        Ok(())
    }
}

/// URLs processed together by one runner invocation. Output order of every
/// runner follows the order here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    urls: Vec<String>,
}

impl Batch {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
