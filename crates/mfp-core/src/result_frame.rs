//! Collected benchmark results, indexed by configuration and by fidelity.

use mfp_common::{Error, Result};
use mfp_math::spearman_matrix;

use crate::benchmark::{BenchResult, Config};

/// Results in insertion order with lookups by configuration and fidelity.
///
/// Configurations and fidelities are listed in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ResultFrame {
    results: Vec<BenchResult>,
    by_config: Vec<(Config, Vec<usize>)>,
    by_fidelity: Vec<(i64, Vec<usize>)>,
}

impl ResultFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: BenchResult) {
        let idx = self.results.len();
        match self.by_config.iter_mut().find(|(c, _)| *c == result.config) {
            Some((_, rows)) => rows.push(idx),
            None => self.by_config.push((result.config.clone(), vec![idx])),
        }
        match self.by_fidelity.iter_mut().find(|(f, _)| *f == result.fidelity) {
            Some((_, rows)) => rows.push(idx),
            None => self.by_fidelity.push((result.fidelity, vec![idx])),
        }
        self.results.push(result);
    }

    /// Number of distinct configurations.
    pub fn len(&self) -> usize {
        self.by_config.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_config.is_empty()
    }

    pub fn configs(&self) -> impl Iterator<Item = &Config> {
        self.by_config.iter().map(|(c, _)| c)
    }

    pub fn fidelities(&self) -> impl Iterator<Item = i64> + '_ {
        self.by_fidelity.iter().map(|(f, _)| *f)
    }

    pub fn results(&self) -> &[BenchResult] {
        &self.results
    }

    pub fn contains_config(&self, config: &Config) -> bool {
        self.by_config.iter().any(|(c, _)| c == config)
    }

    pub fn contains_fidelity(&self, fidelity: i64) -> bool {
        self.by_fidelity.iter().any(|(f, _)| *f == fidelity)
    }

    pub fn for_config(&self, config: &Config) -> Vec<&BenchResult> {
        self.by_config
            .iter()
            .find(|(c, _)| c == config)
            .map(|(_, rows)| self.pick(rows))
            .unwrap_or_default()
    }

    pub fn at_fidelity(&self, fidelity: i64) -> Vec<&BenchResult> {
        self.by_fidelity
            .iter()
            .find(|(f, _)| *f == fidelity)
            .map(|(_, rows)| self.pick(rows))
            .unwrap_or_default()
    }

    fn pick(&self, rows: &[usize]) -> Vec<&BenchResult> {
        rows.iter().map(|&i| &self.results[i]).collect()
    }

    /// Spearman rank correlation of validation error between fidelities.
    ///
    /// Uses the configurations evaluated at every selected fidelity; `at`
    /// defaults to all fidelities in first-seen order. Row and column `i`
    /// of the matrix correspond to the `i`-th selected fidelity.
    pub fn correlations(&self, at: Option<&[i64]>) -> Result<Vec<Vec<f64>>> {
        if self.is_empty() {
            return Err(Error::InsufficientResults(
                "no results recorded, need at least two fidelities".to_string(),
            ));
        }
        if self.by_fidelity.len() <= 1 {
            return Err(Error::InsufficientResults(format!(
                "only one fidelity evaluated: {:?}",
                self.fidelities().collect::<Vec<_>>()
            )));
        }

        let selected: Vec<i64> = match at {
            Some(at) => at.to_vec(),
            None => self.fidelities().collect(),
        };
        if let Some(missing) = selected.iter().find(|f| !self.contains_fidelity(**f)) {
            return Err(Error::InsufficientResults(format!(
                "no results at fidelity {missing}"
            )));
        }

        let common: Vec<&Config> = self
            .configs()
            .filter(|c| {
                selected
                    .iter()
                    .all(|f| self.at_fidelity(*f).iter().any(|r| r.config == **c))
            })
            .collect();
        if common.len() < 2 {
            return Err(Error::InsufficientResults(format!(
                "{} configuration(s) evaluated at all of {selected:?}",
                common.len()
            )));
        }

        let samples: Vec<Vec<f64>> = selected
            .iter()
            .map(|f| {
                let at_f = self.at_fidelity(*f);
                common
                    .iter()
                    .map(|c| {
                        // Last recorded wins when a config was added twice.
                        at_f.iter()
                            .rev()
                            .find(|r| r.config == **c)
                            .map_or(f64::NAN, |r| r.error())
                    })
                    .collect()
            })
            .collect();
        Ok(spearman_matrix(&samples))
    }
}

impl Extend<BenchResult> for ResultFrame {
    fn extend<T: IntoIterator<Item = BenchResult>>(&mut self, iter: T) {
        for result in iter {
            self.add(result);
        }
    }
}

impl FromIterator<BenchResult> for ResultFrame {
    fn from_iter<T: IntoIterator<Item = BenchResult>>(iter: T) -> Self {
        let mut frame = ResultFrame::new();
        frame.extend(iter);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(lr: f64, fidelity: i64, error: f64) -> BenchResult {
        BenchResult {
            config: Config::new().with("lr_initial", lr),
            fidelity,
            valid_error_rate: error,
            test_error_rate: None,
            train_cost: fidelity as f64,
            original_step: None,
            objective: Default::default(),
        }
    }

    #[test]
    fn test_indexes_preserve_insertion_order() {
        let frame: ResultFrame = vec![
            result(0.1, 2, 0.5),
            result(0.2, 1, 0.6),
            result(0.1, 1, 0.7),
        ]
        .into_iter()
        .collect();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.fidelities().collect::<Vec<_>>(), vec![2, 1]);
        let lrs: Vec<f64> = frame.configs().filter_map(|c| c.get("lr_initial")).collect();
        assert_eq!(lrs, vec![0.1, 0.2]);
        assert_eq!(frame.for_config(&Config::new().with("lr_initial", 0.1)).len(), 2);
        assert_eq!(frame.at_fidelity(1).len(), 2);
        assert!(frame.at_fidelity(3).is_empty());
        assert_eq!(frame.results()[1].valid_error_rate, 0.6);
    }

    #[test]
    fn test_correlations_between_fidelities() {
        let mut frame = ResultFrame::new();
        // Fidelity 2 preserves the ordering of fidelity 1, fidelity 3 reverses it.
        for (i, lr) in [0.1, 0.2, 0.3, 0.4].into_iter().enumerate() {
            let e = i as f64 * 0.1;
            frame.add(result(lr, 1, e));
            frame.add(result(lr, 2, e / 2.0));
            frame.add(result(lr, 3, 1.0 - e));
        }
        // Only evaluated at one fidelity, so it is left out.
        frame.add(result(0.9, 1, 0.0));

        let m = frame.correlations(None).unwrap();
        assert_eq!(m.len(), 3);
        assert!((m[0][1] - 1.0).abs() < 1e-12);
        assert!((m[0][2] + 1.0).abs() < 1e-12);
        assert!((m[2][2] - 1.0).abs() < 1e-12);

        let sub = frame.correlations(Some([3, 1].as_slice())).unwrap();
        assert!((sub[0][1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlations_need_two_fidelities() {
        let empty = ResultFrame::new();
        assert!(matches!(
            empty.correlations(None),
            Err(Error::InsufficientResults(_))
        ));

        let mut single = ResultFrame::new();
        single.add(result(0.1, 1, 0.5));
        single.add(result(0.2, 1, 0.4));
        assert!(matches!(
            single.correlations(None),
            Err(Error::InsufficientResults(_))
        ));

        single.add(result(0.1, 2, 0.3));
        assert!(single.correlations(Some([1, 5].as_slice())).is_err());
        // One config at both fidelities is too few to rank.
        assert!(single.correlations(None).is_err());
    }
}
