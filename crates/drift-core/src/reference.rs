//! Reference set storage, preprocessing and update policies

use crate::data::{hstack, select_rows, vstack};
use crate::traits::SharedPreprocessor;
use crate::{Error, Result};
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::debug;

/// How the reference set evolves after each prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceUpdate {
    /// Keep the initial reference set
    #[default]
    Fixed,
    /// Keep the most recent `n` instances seen
    LastN(usize),
    /// Uniform reservoir sample of size `n` over everything seen
    Reservoir(usize),
}

impl ReferenceUpdate {
    pub fn validate(&self) -> Result<()> {
        match self {
            ReferenceUpdate::LastN(0) | ReferenceUpdate::Reservoir(0) => Err(
                Error::InvalidParameter("reference update size must be positive".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Fold `x` into `x_ref` according to `policy`
///
/// `n_seen` is the number of instances observed so far, including the
/// initial reference set. It is advanced by `x.nrows()`.
pub fn update_reference<R: Rng + ?Sized>(
    x_ref: &DMatrix<f64>,
    x: &DMatrix<f64>,
    n_seen: &mut usize,
    policy: ReferenceUpdate,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    if x.nrows() > 0 && x_ref.nrows() > 0 && x.ncols() != x_ref.ncols() {
        return Err(Error::size_mismatch(x_ref.ncols(), x.ncols(), "reference update"));
    }
    let updated = match policy {
        ReferenceUpdate::Fixed => x_ref.clone(),
        ReferenceUpdate::LastN(n) => {
            let all = vstack(x_ref, x)?;
            let start = all.nrows().saturating_sub(n);
            let keep: Vec<usize> = (start..all.nrows()).collect();
            select_rows(&all, &keep)
        }
        ReferenceUpdate::Reservoir(n) => reservoir_sample(x_ref, x, *n_seen, n, rng)?,
    };
    *n_seen += x.nrows();
    Ok(updated)
}

fn reservoir_sample<R: Rng + ?Sized>(
    x_ref: &DMatrix<f64>,
    x: &DMatrix<f64>,
    n_seen: usize,
    size: usize,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    let mut reservoir = if x_ref.nrows() > size {
        let keep: Vec<usize> = (x_ref.nrows() - size..x_ref.nrows()).collect();
        select_rows(x_ref, &keep)
    } else {
        x_ref.clone()
    };
    let mut n = n_seen;
    let mut start = 0;

    // Fill the reservoir before sampling
    if reservoir.nrows() < size {
        let take = (size - reservoir.nrows()).min(x.nrows());
        let fill: Vec<usize> = (0..take).collect();
        reservoir = vstack(&reservoir, &select_rows(x, &fill))?;
        n += take;
        start = take;
    }

    for i in start..x.nrows() {
        n += 1;
        let r = rng.gen_range(0..n);
        if r < size {
            reservoir.set_row(r, &x.row(i));
        }
    }
    Ok(reservoir)
}

/// Reference data together with its preprocessing
///
/// With `preprocess_at_init` the reference is transformed once and stored
/// transformed; otherwise the raw reference is stored and transformed on
/// every call.
#[derive(Clone)]
pub struct Reference {
    data: DMatrix<f64>,
    preprocessor: Option<SharedPreprocessor>,
    preprocessed: bool,
    policy: ReferenceUpdate,
    n_seen: usize,
}

impl Reference {
    pub fn new(
        x_ref: DMatrix<f64>,
        preprocessor: Option<SharedPreprocessor>,
        preprocess_at_init: bool,
        policy: ReferenceUpdate,
    ) -> Result<Self> {
        policy.validate()?;
        let n_seen = x_ref.nrows();
        let (data, preprocessed) = match (&preprocessor, preprocess_at_init) {
            (Some(p), true) => (p.transform(&x_ref)?, true),
            (Some(_), false) => (x_ref, false),
            (None, _) => (x_ref, true),
        };
        debug!(
            "Reference set of {} x {} (preprocessed: {preprocessed})",
            data.nrows(),
            data.ncols()
        );
        Ok(Self {
            data,
            preprocessor,
            preprocessed,
            policy,
            n_seen,
        })
    }

    /// The stored reference, in stored space
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Total number of instances observed, including the initial reference
    pub fn n_seen(&self) -> usize {
        self.n_seen
    }

    pub fn policy(&self) -> ReferenceUpdate {
        self.policy
    }

    /// Whether the stored reference is already in model space
    pub fn is_preprocessed(&self) -> bool {
        self.preprocessed
    }

    /// Transform a test batch into model space
    pub fn transform<'a>(&self, x: &'a DMatrix<f64>) -> Result<Cow<'a, DMatrix<f64>>> {
        match &self.preprocessor {
            Some(p) => Ok(Cow::Owned(p.transform(x)?)),
            None => Ok(Cow::Borrowed(x)),
        }
    }

    /// The reference in model space
    pub fn model_space(&self) -> Result<Cow<'_, DMatrix<f64>>> {
        if self.preprocessed {
            Ok(Cow::Borrowed(&self.data))
        } else {
            self.transform(&self.data)
        }
    }

    /// Reference and test batch, both in model space
    pub fn prepare<'a>(
        &'a self,
        x: &'a DMatrix<f64>,
    ) -> Result<(Cow<'a, DMatrix<f64>>, Cow<'a, DMatrix<f64>>)> {
        Ok((self.model_space()?, self.transform(x)?))
    }

    /// Fold a batch into the reference set
    ///
    /// `raw` is the batch as passed by the caller and `processed` the same
    /// batch in model space; the one matching the stored space is used.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        raw: &DMatrix<f64>,
        processed: &DMatrix<f64>,
        rng: &mut R,
    ) -> Result<()> {
        if self.policy == ReferenceUpdate::Fixed {
            self.n_seen += raw.nrows();
            return Ok(());
        }
        let x = if self.preprocessed { processed } else { raw };
        self.data = update_reference(&self.data, x, &mut self.n_seen, self.policy, rng)?;
        debug!(
            "Reference updated ({:?}): {} rows, {} seen",
            self.policy,
            self.data.nrows(),
            self.n_seen
        );
        Ok(())
    }

    /// Fold a batch into the reference set together with row-aligned side data
    ///
    /// `paired_ref` holds one row per reference instance (e.g. contexts) and
    /// receives exactly the rows kept for the reference, so both stay aligned
    /// under every policy.
    pub fn update_paired<R: Rng + ?Sized>(
        &mut self,
        raw: &DMatrix<f64>,
        processed: &DMatrix<f64>,
        paired_ref: &mut DMatrix<f64>,
        paired: &DMatrix<f64>,
        rng: &mut R,
    ) -> Result<()> {
        if self.policy == ReferenceUpdate::Fixed {
            self.n_seen += raw.nrows();
            return Ok(());
        }
        let x = if self.preprocessed { processed } else { raw };
        let n_cols = self.data.ncols();
        let joint_ref = hstack(&self.data, paired_ref)?;
        let joint = hstack(x, paired)?;
        let updated = update_reference(&joint_ref, &joint, &mut self.n_seen, self.policy, rng)?;
        self.data = updated.columns(0, n_cols).into_owned();
        *paired_ref = updated.columns(n_cols, updated.ncols() - n_cols).into_owned();
        debug!(
            "Paired reference updated ({:?}): {} rows, {} seen",
            self.policy,
            self.data.nrows(),
            self.n_seen
        );
        Ok(())
    }
}
