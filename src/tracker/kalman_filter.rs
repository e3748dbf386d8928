//! Constant-velocity Kalman filter over box measurements.
//!
//! State is `(cx, cy, a, h, vcx, vcy, va, vh)`: box centre, aspect ratio,
//! height and their per-frame velocities. Measurements are `(cx, cy, a, h)`.

use nalgebra::{SMatrix, SVector};
use tracing::warn;

pub type StateMean = SVector<f64, 8>;
pub type StateCovariance = SMatrix<f64, 8, 8>;
pub type Measurement = SVector<f64, 4>;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: SMatrix<f64, 8, 8>,
    update_mat: SMatrix<f64, 4, 8>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion_mat = SMatrix::<f64, 8, 8>::identity();
        let mut update_mat = SMatrix::<f64, 4, 8>::zeros();
        for i in 0..4 {
            motion_mat[(i, 4 + i)] = 1.0;
            update_mat[(i, i)] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Starts a state at the measured box with zero velocity.
    pub fn initiate(&self, measurement: [f64; 4]) -> (StateMean, StateCovariance) {
        let mut mean = StateMean::zeros();
        mean.fixed_rows_mut::<4>(0)
            .copy_from(&Measurement::from(measurement));

        let h = measurement[3];
        let pos = 2.0 * self.std_weight_position * h;
        let vel = 10.0 * self.std_weight_velocity * h;
        let std = [pos, pos, 1e-2, pos, vel, vel, 1e-5, vel];

        (mean, diagonal_covariance(std))
    }

    /// Advances the state one frame.
    pub fn predict(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (StateMean, StateCovariance) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let vel = self.std_weight_velocity * h;
        let motion_cov = diagonal_covariance([pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);

        let new_mean = self.motion_mat * mean;
        let new_covariance = self.motion_mat * covariance * self.motion_mat.transpose() + motion_cov;
        (new_mean, new_covariance)
    }

    /// Projects the state into measurement space.
    pub fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (Measurement, SMatrix<f64, 4, 4>) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let innovation_cov = SMatrix::<f64, 4, 4>::from_diagonal(&SVector::from([
            pos * pos,
            pos * pos,
            1e-1 * 1e-1,
            pos * pos,
        ]));

        let projected_mean = self.update_mat * mean;
        let projected_cov = self.update_mat * covariance * self.update_mat.transpose() + innovation_cov;
        (projected_mean, projected_cov)
    }

    /// Corrects the state with a measured box.
    ///
    /// A singular innovation covariance leaves the state untouched.
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: [f64; 4],
    ) -> (StateMean, StateCovariance) {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let Some(s_inv) = projected_cov.try_inverse() else {
            warn!("singular innovation covariance, skipping correction");
            return (*mean, *covariance);
        };

        let kalman_gain = covariance * self.update_mat.transpose() * s_inv;
        let innovation = Measurement::from(measurement) - projected_mean;

        let new_mean = mean + kalman_gain * innovation;
        let new_covariance = covariance - kalman_gain * projected_cov * kalman_gain.transpose();
        (new_mean, new_covariance)
    }
}

fn diagonal_covariance(std: [f64; 8]) -> StateCovariance {
    StateCovariance::from_diagonal(&StateMean::from(std.map(|s| s * s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([100.0, 200.0, 1.0, 50.0]);
        assert_eq!(mean[0], 100.0);
        assert_eq!(mean[3], 50.0);
        assert_eq!(mean[4], 0.0);
        assert!(cov[(0, 0)] > 0.0);
        assert_eq!(cov[(0, 1)], 0.0);
    }

    #[test]
    fn test_predict_without_velocity_keeps_position() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([100.0, 200.0, 1.0, 50.0]);
        let (predicted, predicted_cov) = kf.predict(&mean, &cov);
        assert!((predicted[0] - 100.0).abs() < 1e-9);
        assert!(predicted_cov[(0, 0)] > cov[(0, 0)]);
    }

    #[test]
    fn test_update_learns_velocity() {
        let kf = KalmanFilter::new();
        let (mut mean, mut cov) = kf.initiate([100.0, 100.0, 1.0, 50.0]);
        for step in 1..=10 {
            let (m, c) = kf.predict(&mean, &cov);
            let (m, c) = kf.update(&m, &c, [100.0 + 5.0 * step as f64, 100.0, 1.0, 50.0]);
            mean = m;
            cov = c;
        }
        assert!((mean[0] - 150.0).abs() < 2.0);
        assert!(mean[4] > 3.0, "velocity estimate {}", mean[4]);
    }
}
