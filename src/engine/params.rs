//! Named parameter tensors and their gradients

use ndarray::ArrayD;

use crate::error::{EwcError, Result};

/// A single trainable tensor
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: ArrayD<f32>,
}

/// Ordered collection of parameters. Enumeration order and shapes never change
/// after construction.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    pub fn push(&mut self, name: impl Into<String>, value: ArrayD<f32>) {
        self.params.push(Parameter { name: name.into(), value });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.params.iter_mut()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of scalar elements across all tensors
    pub fn element_count(&self) -> usize {
        self.params.iter().map(|p| p.value.len()).sum()
    }
}

/// Gradient tensors laid out exactly like a `ParameterSet`
#[derive(Debug, Clone, Default)]
pub struct Gradients {
    tensors: Vec<(String, ArrayD<f32>)>,
}

impl Gradients {
    pub fn zeros_like(params: &ParameterSet) -> Self {
        Self {
            tensors: params
                .iter()
                .map(|p| (p.name.clone(), ArrayD::zeros(p.value.raw_dim())))
                .collect(),
        }
    }

    pub fn from_parts(tensors: Vec<(String, ArrayD<f32>)>) -> Self {
        Self { tensors }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.tensors.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Fails unless `self` and `other` name the same tensors with the same shapes.
    fn check_layout(&self, other: &Gradients) -> Result<()> {
        if self.tensors.len() != other.tensors.len() {
            return Err(EwcError::config(format!(
                "gradient layout mismatch: {} tensors vs {}",
                self.tensors.len(),
                other.tensors.len()
            )));
        }
        for ((a_name, a), (b_name, b)) in self.tensors.iter().zip(other.tensors.iter()) {
            if a_name != b_name || a.shape() != b.shape() {
                return Err(EwcError::config(format!(
                    "gradient layout mismatch: {} {:?} vs {} {:?}",
                    a_name,
                    a.shape(),
                    b_name,
                    b.shape()
                )));
            }
        }
        Ok(())
    }

    /// `self += other`
    pub fn accumulate(&mut self, other: &Gradients) -> Result<()> {
        self.scaled_add(1.0, other)
    }

    /// `self += alpha * other`
    pub fn scaled_add(&mut self, alpha: f32, other: &Gradients) -> Result<()> {
        self.check_layout(other)?;
        for ((_, a), (_, b)) in self.tensors.iter_mut().zip(other.tensors.iter()) {
            a.scaled_add(alpha, b);
        }
        Ok(())
    }

    /// Element-wise square of every tensor
    pub fn squared(&self) -> Gradients {
        Gradients {
            tensors: self
                .tensors
                .iter()
                .map(|(n, t)| (n.clone(), t.mapv(|g| g * g)))
                .collect(),
        }
    }

    pub fn fill_zero(&mut self) {
        for (_, t) in &mut self.tensors {
            t.fill(0.0);
        }
    }

    pub fn l2_norm(&self) -> f32 {
        self.tensors
            .iter()
            .map(|(_, t)| t.iter().map(|g| g * g).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }

    /// True when every element is finite
    pub fn is_finite(&self) -> bool {
        self.tensors
            .iter()
            .all(|(_, t)| t.iter().all(|g| g.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn params() -> ParameterSet {
        let mut set = ParameterSet::new();
        set.push("w", arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn());
        set.push("b", arr1(&[0.5f32, -0.5]).into_dyn());
        set
    }

    #[test]
    fn test_parameter_set() {
        let set = params();
        assert_eq!(set.len(), 2);
        assert_eq!(set.element_count(), 6);
        assert_eq!(set.get("b").unwrap().value.shape(), &[2]);
        let names: Vec<_> = set.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["w", "b"]);
    }

    #[test]
    fn test_gradient_arithmetic() {
        let set = params();
        let mut grads = Gradients::zeros_like(&set);
        let other = Gradients::from_parts(vec![
            ("w".into(), arr2(&[[1.0f32, -1.0], [2.0, 0.0]]).into_dyn()),
            ("b".into(), arr1(&[3.0f32, 4.0]).into_dyn()),
        ]);
        grads.accumulate(&other).unwrap();
        grads.scaled_add(0.5, &other).unwrap();
        assert_eq!(grads.get("b").unwrap(), &arr1(&[4.5f32, 6.0]).into_dyn());

        let sq = other.squared();
        assert_eq!(sq.get("w").unwrap(), &arr2(&[[1.0f32, 1.0], [4.0, 0.0]]).into_dyn());
        assert!((other.l2_norm() - 31.0f32.sqrt()).abs() < 1e-6);

        grads.fill_zero();
        assert_eq!(grads.l2_norm(), 0.0);
    }

    #[test]
    fn test_layout_mismatch() {
        let set = params();
        let mut grads = Gradients::zeros_like(&set);
        let wrong = Gradients::from_parts(vec![
            ("w".into(), arr2(&[[1.0f32, 2.0, 3.0]]).into_dyn()),
            ("b".into(), arr1(&[0.0f32, 0.0]).into_dyn()),
        ]);
        assert!(matches!(grads.accumulate(&wrong), Err(EwcError::Configuration(_))));
    }
}
