use std::time::Instant;

use biomatch_kdtree::{KdTree, KdTreeParams};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::IcpError;
use crate::fit::{LeastSquaresFit, TransformFit};
use crate::ops::{compute_centroid, count_below, cutoff_radius, rank_by_distance};
use crate::params::IcpParams;
use crate::transform::{AffineTransform, Transform};
use crate::vertices::{promote_pair, PromotedVertices, VertexSource, Vertices};

/// The reason a registration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The mean matched distance fell below the threshold.
    BelowThreshold,
    /// The mean matched distance improved by less than the threshold.
    Plateau,
    /// The summed matched distance increased. The transform with the lowest
    /// summed distance is kept.
    Diverged,
    /// The iteration cap was reached.
    MaxIterations,
}

impl Termination {
    /// Whether the registration is considered converged.
    pub fn is_converged(self) -> bool {
        !matches!(self, Termination::MaxIterations)
    }
}

/// Summary of a single registration iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    /// Number of completed iterations, including this one.
    pub iteration: usize,
    /// Sum of the matched distances of all source vertices.
    pub sum_distance: f64,
    /// Mean matched distance of the source vertices.
    pub mean_distance: f64,
    /// Number of matches kept for the fit.
    pub n_match: usize,
    /// Distance cutoff used to reject matches.
    pub cutoff: f64,
    /// Set when this iteration ended the registration.
    pub termination: Option<Termination>,
}

/// Result of a registration.
///
/// The transform maps the source vertices onto the target vertices and is
/// only returned for a converged registration.
#[derive(Debug, Clone, PartialEq)]
pub struct IcpResult<T> {
    /// The estimated transform, `None` unless converged.
    pub transform: Option<T>,
    /// Whether the registration converged.
    pub converged: bool,
    /// The number of iterations performed.
    pub iterations: usize,
    /// The reason the registration stopped.
    pub termination: Termination,
    /// Mean matched distance of every iteration.
    pub mean_distances: Vec<f64>,
}

impl<T> IcpResult<T> {
    /// Maps the transform of the result.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> IcpResult<U> {
        IcpResult {
            transform: self.transform.map(f),
            converged: self.converged,
            iterations: self.iterations,
            termination: self.termination,
            mean_distances: self.mean_distances,
        }
    }
}

/// State of an Iterative Closest Point registration.
///
/// Holds a kd-tree over the target vertices, the accumulated transform and the
/// scratch buffers of the matching step. Each [`IcpWorkspace::step`] matches
/// every transformed source vertex with its nearest target vertex and tests
/// for convergence. While the registration keeps going, the matches closer
/// than the cutoff are fitted and the increment is composed with the
/// accumulated transform.
///
/// The cutoff is `2 * sqrt(d^2 + 1)`, `d` being the distance between the
/// target centroid and the centroid of the untransformed source. It is fixed
/// for the whole registration.
pub struct IcpWorkspace<'a, const D: usize, F = LeastSquaresFit> {
    target: &'a [[f64; D]],
    source: &'a [[f64; D]],
    params: IcpParams,
    fitter: F,
    tree: KdTree<f64>,
    target_centroid: [f64; D],
    source_centroid: [f64; D],
    cutoff: f64,
    transform: AffineTransform<D>,
    // lowest summed distance seen and the transform that produced it
    best: Option<(f64, AffineTransform<D>)>,
    moved: Vec<[f64; D]>,
    nearest: Vec<usize>,
    distances: Vec<f64>,
    rank: Vec<usize>,
    src_match: Vec<[f64; D]>,
    dst_match: Vec<[f64; D]>,
    n_match: usize,
    iteration: usize,
    sum_last: Option<f64>,
    mean_distances: Vec<f64>,
    termination: Option<Termination>,
}

impl<'a, const D: usize> IcpWorkspace<'a, D> {
    /// Creates a workspace using the default least-squares fit.
    ///
    /// # Arguments
    ///
    /// * `target` - The vertices to register onto.
    /// * `source` - The vertices to move.
    /// * `params` - The registration parameters.
    pub fn new(
        target: &'a [[f64; D]],
        source: &'a [[f64; D]],
        params: &IcpParams,
    ) -> Result<Self, IcpError> {
        Self::with_fit(target, source, params, LeastSquaresFit)
    }
}

impl<'a, const D: usize, F: TransformFit<D>> IcpWorkspace<'a, D, F> {
    /// Creates a workspace using a custom transform fit.
    pub fn with_fit(
        target: &'a [[f64; D]],
        source: &'a [[f64; D]],
        params: &IcpParams,
        fitter: F,
    ) -> Result<Self, IcpError> {
        params.validate()?;
        if target.is_empty() {
            return Err(IcpError::EmptyVertexSet("target"));
        }
        if source.is_empty() {
            return Err(IcpError::EmptyVertexSet("source"));
        }

        let mut rank = Vec::new();
        rank.try_reserve_exact(target.len().max(source.len()))?;
        let mut moved = Vec::new();
        moved.try_reserve_exact(source.len())?;
        moved.resize(source.len(), [0.0; D]);
        let mut nearest = Vec::new();
        nearest.try_reserve_exact(source.len())?;
        nearest.resize(source.len(), 0);
        let mut distances = Vec::new();
        distances.try_reserve_exact(source.len())?;
        distances.resize(source.len(), 0.0);
        let mut src_match = Vec::new();
        src_match.try_reserve_exact(source.len())?;
        let mut dst_match = Vec::new();
        dst_match.try_reserve_exact(source.len())?;

        // insert the targets in a shuffled order so the tree is balanced on average
        let mut tree =
            KdTree::<f64>::new(D, KdTreeParams::new(params.tree_tolerance, target.len()))?;
        rank.extend(0..target.len());
        rank.shuffle(&mut StdRng::seed_from_u64(params.shuffle_seed));
        let mut duplicates = 0;
        for &i in &rank {
            if tree.insert_with_index(&target[i], i)?.is_duplicate() {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            log::debug!("Skipped {} duplicate target vertices", duplicates);
        }

        let target_centroid = compute_centroid(target);
        let source_centroid = compute_centroid(source);
        let cutoff = cutoff_radius(&target_centroid, &source_centroid);

        Ok(Self {
            target,
            source,
            params: params.clone(),
            fitter,
            tree,
            target_centroid,
            source_centroid,
            cutoff,
            transform: AffineTransform::identity(),
            best: None,
            moved,
            nearest,
            distances,
            rank,
            src_match,
            dst_match,
            n_match: 0,
            iteration: 0,
            sum_last: None,
            mean_distances: Vec::new(),
            termination: None,
        })
    }

    /// Starts the registration from `initial` instead of the identity.
    pub fn with_initial(mut self, initial: AffineTransform<D>) -> Self {
        self.transform = initial;
        self
    }

    /// The accumulated transform.
    pub fn transform(&self) -> &AffineTransform<D> {
        &self.transform
    }

    /// The number of completed iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// The centroid of the target vertices.
    pub fn target_centroid(&self) -> &[f64; D] {
        &self.target_centroid
    }

    /// The centroid of the untransformed source vertices.
    pub fn source_centroid(&self) -> &[f64; D] {
        &self.source_centroid
    }

    /// The distance beyond which matches are rejected.
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// The kd-tree over the target vertices.
    pub fn tree(&self) -> &KdTree<f64> {
        &self.tree
    }

    /// The reason the registration stopped, if it has.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// The matches kept by the last iteration as `(source, target, distance)`,
    /// ordered by ascending distance.
    pub fn matches(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rank[..self.n_match]
            .iter()
            .map(|&i| (i, self.nearest[i], self.distances[i]))
    }

    /// Performs one registration iteration.
    ///
    /// Fails with [`IcpError::Terminated`] once the registration has stopped.
    pub fn step(&mut self) -> Result<IterationReport, IcpError> {
        if self.termination.is_some() {
            return Err(IcpError::Terminated);
        }

        // NOTE: for debugging purposes, we measure the time taken for each iteration
        let now = Instant::now();

        // match every transformed source vertex with its nearest target
        self.transform.apply_into(self.source, &mut self.moved);
        let mut sum = 0.0;
        for (i, p) in self.moved.iter().enumerate() {
            let nn = self
                .tree
                .nearest_neighbor(p, f64::INFINITY)?
                .ok_or(IcpError::EmptyVertexSet("target"))?;
            self.nearest[i] = nn.index;
            self.distances[i] = nn.distance;
            sum += nn.distance;
        }
        let mean = sum / self.source.len() as f64;

        // keep the closest matches, up to the cutoff
        rank_by_distance(&mut self.rank, &self.distances);
        self.n_match = count_below(&self.rank, &self.distances, self.cutoff);

        if self.best.map_or(true, |(best_sum, _)| sum < best_sum) {
            self.best = Some((sum, self.transform));
        }
        self.iteration += 1;
        self.mean_distances.push(mean);

        let threshold = self.params.distance_threshold;
        let mut termination = match self.sum_last {
            _ if mean < threshold => Some(Termination::BelowThreshold),
            Some(last) if last < sum => Some(Termination::Diverged),
            Some(last) if (last - sum) / (self.source.len() as f64) < threshold => {
                Some(Termination::Plateau)
            }
            _ => None,
        };
        self.sum_last = Some(sum);

        match termination {
            Some(Termination::Diverged) => {
                if let Some((_, best)) = self.best {
                    self.transform = best;
                }
            }
            Some(_) => {}
            None => {
                self.fit_matches()?;
                let max_iterations = self.params.max_iterations as usize;
                if max_iterations > 0 && self.iteration >= max_iterations {
                    termination = Some(Termination::MaxIterations);
                }
            }
        }

        log::debug!(
            "Iteration {}: sum {:.6}, mean {:.6}, matches {}/{}, cutoff {:.6}, took {:?}",
            self.iteration,
            sum,
            mean,
            self.n_match,
            self.source.len(),
            self.cutoff,
            now.elapsed()
        );

        if let Some(termination) = termination {
            self.termination = Some(termination);
            if termination.is_converged() {
                log::info!(
                    "Registration converged ({:?}) after {} iterations",
                    termination,
                    self.iteration
                );
            } else {
                log::warn!(
                    "Registration did not converge after {} iterations",
                    self.iteration
                );
            }
        }

        Ok(IterationReport {
            iteration: self.iteration,
            sum_distance: sum,
            mean_distance: mean,
            n_match: self.n_match,
            cutoff: self.cutoff,
            termination,
        })
    }

    // Fits the kept matches and composes the increment with the transform.
    fn fit_matches(&mut self) -> Result<(), IcpError> {
        self.src_match.clear();
        self.dst_match.clear();
        for &i in &self.rank[..self.n_match] {
            self.src_match.push(self.moved[i]);
            self.dst_match.push(self.target[self.nearest[i]]);
        }

        let increment = self
            .fitter
            .fit(self.params.transform, &self.src_match, &self.dst_match)?;
        self.transform = increment.compose(&self.transform);
        Ok(())
    }

    /// Iterates until the registration terminates.
    ///
    /// The transform is handed over only if the registration converged.
    pub fn run(mut self) -> Result<IcpResult<AffineTransform<D>>, IcpError> {
        let termination = match self.termination {
            Some(termination) => termination,
            None => loop {
                if let Some(termination) = self.step()?.termination {
                    break termination;
                }
            },
        };

        let converged = termination.is_converged();
        Ok(IcpResult {
            transform: converged.then_some(self.transform),
            converged,
            iterations: self.iteration,
            termination,
            mean_distances: self.mean_distances,
        })
    }
}

/// Registers `source` onto `target` with the Iterative Closest Point algorithm.
///
/// # Arguments
///
/// * `target` - The vertices to register onto.
/// * `source` - The vertices to move.
/// * `params` - The registration parameters.
///
/// # Returns
///
/// The registration result, whose transform maps `source` onto `target`.
///
/// Example:
///
/// ```
/// use biomatch_icp::{icp_register, IcpParams};
///
/// let target = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
/// let res = icp_register(&target, &target, &IcpParams::default()).unwrap();
/// assert!(res.converged);
/// assert_eq!(res.iterations, 1);
/// ```
pub fn icp_register<const D: usize>(
    target: &[[f64; D]],
    source: &[[f64; D]],
    params: &IcpParams,
) -> Result<IcpResult<AffineTransform<D>>, IcpError> {
    IcpWorkspace::new(target, source, params)?.run()
}

/// Registers two vertex sets of any vertex type.
///
/// Both sets are promoted to double precision and must share a dimension.
pub fn register_vertices(
    target: &Vertices,
    source: &Vertices,
    params: &IcpParams,
) -> Result<IcpResult<Transform>, IcpError> {
    match promote_pair(target, source)? {
        (PromotedVertices::D2(target), PromotedVertices::D2(source)) => {
            Ok(icp_register(&target, &source, params)?.map(Transform::TwoD))
        }
        (PromotedVertices::D3(target), PromotedVertices::D3(source)) => {
            Ok(icp_register(&target, &source, params)?.map(Transform::ThreeD))
        }
        (target, source) => Err(IcpError::DimensionMismatch {
            target_dim: target.dim(),
            source_dim: source.dim(),
        }),
    }
}

/// Registers the vertices of two geometric objects.
pub fn register_objects<T, S>(
    target: &T,
    source: &S,
    params: &IcpParams,
) -> Result<IcpResult<Transform>, IcpError>
where
    T: VertexSource + ?Sized,
    S: VertexSource + ?Sized,
{
    let target = target.vertices()?;
    let source = source.vertices()?;
    register_vertices(&target, &source, params)
}
