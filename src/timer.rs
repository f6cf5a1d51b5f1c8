use std::ops::Mul;
use std::time::Duration;

/// Doubling retransmission timeout with a ceiling and a retry budget.
///
/// Every flight restarts from the initial RTO. Each retry doubles the RTO,
/// saturating at the configured ceiling.
#[derive(Debug)]
pub(crate) struct ExponentialBackoff {
    start_rto: Duration,
    max_rto: Duration,
    retries: usize,
    rto: Duration,
    left: usize,
}

impl ExponentialBackoff {
    pub fn new(start_rto: Duration, max_rto: Duration, retries: usize) -> Self {
        Self {
            start_rto,
            max_rto,
            retries,
            rto: start_rto,
            left: retries,
        }
    }

    pub fn reset(&mut self) {
        self.rto = self.start_rto;
        self.left = self.retries;
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn attempt(&mut self) {
        let (n, overflow) = self.left.overflowing_sub(1);

        if overflow {
            return;
        }

        self.left = n;
        self.rto = self.rto.mul(2).min(self.max_rto);
    }

    pub fn can_retry(&self) -> bool {
        self.left > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn doubles_up_to_ceiling() {
        let mut exp =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 7);

        let mut rtos = Vec::new();
        while exp.can_retry() {
            rtos.push(exp.rto().as_secs());
            exp.attempt();
        }

        assert_eq!(rtos, [1, 2, 4, 8, 16, 32, 60]);
        assert!(!exp.can_retry());

        // Further attempts change nothing.
        exp.attempt();
        assert_eq!(exp.rto().as_secs(), 60);
        assert!(!exp.can_retry());
    }

    #[test]
    fn reset_restores_budget() {
        let mut exp =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 3);
        exp.attempt();
        exp.attempt();
        exp.attempt();
        assert!(!exp.can_retry());

        exp.reset();
        assert_eq!(exp.rto().as_secs(), 1);
        assert!(exp.can_retry());
    }
}
