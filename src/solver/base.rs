/// An estimator that runs for a bounded number of rounds.
///
/// `repeat` is the iteration budget (RANSAC hypotheses, refinement rounds);
/// closed-form solvers ignore it.
pub trait Solver<Output>: Send + Sync
where
    Output: Send,
{
    /// Budget used by [`Solver::solve_to_end`].
    const MAX_ITER: usize = 0;

    fn solve(self, repeat: usize) -> Output;

    #[inline]
    fn solve_to_end(self) -> Output
    where
        Self: Sized,
    {
        self.solve(Self::MAX_ITER)
    }
}
