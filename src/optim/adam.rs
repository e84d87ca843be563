//! Adam optimizer

use super::{Optimizer, OptimizerSnapshot};
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use ndarray::Array1;

/// Adam optimizer (Adaptive Moment Estimation)
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Option<Array1<f32>>>, // First moment
    v: Vec<Option<Array1<f32>>>, // Second moment
}

impl Adam {
    /// Create a new Adam optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Create Adam with default parameters
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Initialize moments if needed
    fn ensure_moments(&mut self, params: &[Tensor]) {
        if self.m.is_empty() {
            self.m = params.iter().map(|_| None).collect();
            self.v = params.iter().map(|_| None).collect();
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_moments(params);
        self.t += 1;

        // Bias correction factors
        let lr_t = self.lr
            * ((1.0 - self.beta2.powi(self.t as i32)).sqrt()
                / (1.0 - self.beta1.powi(self.t as i32)));

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad() {
                // m_t = β1 * m_{t-1} + (1 - β1) * g
                let m_t = if let Some(m) = &self.m[i] {
                    m * self.beta1 + &grad * (1.0 - self.beta1)
                } else {
                    &grad * (1.0 - self.beta1)
                };

                // v_t = β2 * v_{t-1} + (1 - β2) * g²
                let grad_sq = &grad * &grad;
                let v_t = if let Some(v) = &self.v[i] {
                    v * self.beta2 + &grad_sq * (1.0 - self.beta2)
                } else {
                    &grad_sq * (1.0 - self.beta2)
                };

                // θ_t = θ_{t-1} - lr_t * m_t / (√v_t + ε)
                let update = &m_t / &(v_t.mapv(f32::sqrt) + self.epsilon) * lr_t;
                *param.data_mut() = param.data() - &update;

                self.m[i] = Some(m_t);
                self.v[i] = Some(v_t);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn state(&self) -> OptimizerSnapshot {
        OptimizerSnapshot {
            lr: self.lr,
            step_count: self.t,
            first_moment: self.m.iter().map(|m| m.as_ref().map(|a| a.to_vec())).collect(),
            second_moment: self.v.iter().map(|v| v.as_ref().map(|a| a.to_vec())).collect(),
        }
    }

    fn load_state(&mut self, snapshot: OptimizerSnapshot) -> Result<()> {
        if snapshot.first_moment.len() != snapshot.second_moment.len() {
            return Err(Error::Serialization(format!(
                "moment lists disagree: {} first vs {} second",
                snapshot.first_moment.len(),
                snapshot.second_moment.len()
            )));
        }
        self.lr = snapshot.lr;
        self.t = snapshot.step_count;
        self.m = snapshot
            .first_moment
            .into_iter()
            .map(|m| m.map(Array1::from))
            .collect();
        self.v = snapshot
            .second_moment
            .into_iter()
            .map(|v| v.map(Array1::from))
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_adam_quadratic_convergence() {
        // Test convergence on f(x) = x²
        let mut params = vec![Tensor::from_vec(vec![5.0, -3.0, 2.0], true)];
        let mut optimizer = Adam::default_params(0.1);

        for _ in 0..100 {
            // Compute gradient: ∇(x²) = 2x
            let grad = params[0].data().mapv(|x| 2.0 * x);
            params[0].set_grad(grad);

            optimizer.step(&mut params);
        }

        // Should converge close to 0
        for &val in params[0].data().iter() {
            assert!(val.abs() < 0.5, "Value {} did not converge", val);
        }
    }

    #[test]
    fn test_zero_grad_clears_all_params() {
        let mut params = vec![
            Tensor::from_vec(vec![1.0], true),
            Tensor::from_vec(vec![2.0], true),
        ];
        params[0].set_grad(Array1::from(vec![0.5]));
        params[1].set_grad(Array1::from(vec![0.5]));

        let mut optimizer = Adam::default_params(0.1);
        optimizer.zero_grad(&mut params);
        assert!(params[0].grad().is_none());
        assert!(params[1].grad().is_none());
    }

    #[test]
    fn test_state_roundtrip_resumes_exactly() {
        let mut params_a = vec![Tensor::from_vec(vec![5.0, -3.0], true)];
        let mut params_b = vec![Tensor::from_vec(vec![5.0, -3.0], true)];
        let mut opt_a = Adam::default_params(0.1);

        let step = |params: &mut Vec<Tensor>, opt: &mut Adam| {
            let grad = params[0].data().mapv(|x| 2.0 * x);
            params[0].set_grad(grad);
            opt.step(params);
        };

        for _ in 0..5 {
            step(&mut params_a, &mut opt_a);
        }

        // Replay the first five steps, then continue via a restored optimizer
        let mut opt_b = Adam::default_params(0.1);
        for _ in 0..5 {
            step(&mut params_b, &mut opt_b);
        }
        let mut restored = Adam::default_params(999.0);
        restored.load_state(opt_b.state()).unwrap();

        step(&mut params_a, &mut opt_a);
        step(&mut params_b, &mut restored);

        for (a, b) in params_a[0].data().iter().zip(params_b[0].data().iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_load_state_rejects_mismatched_moments() {
        let snap = OptimizerSnapshot {
            lr: 0.1,
            step_count: 1,
            first_moment: vec![None, None],
            second_moment: vec![None],
        };
        let mut optimizer = Adam::default_params(0.1);
        assert!(optimizer.load_state(snap).is_err());
    }
}
