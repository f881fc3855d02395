//! `.save` files: every layer's neurons, one line per neuron.
//!
//! ```text
//! Layer: <neuron count>
//! <aggregation id> <n> <coefs…> <activation id> <n> <coefs…> <n> <bias…> <n> <weights…>
//! ```

use crate::lines::Lines;
use neurite_core::{NeuriteError, NeuriteResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything needed to rebuild one neuron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronRecord {
    pub aggregation: usize,
    pub aggregation_coefs: Vec<f64>,
    pub activation: usize,
    pub activation_coefs: Vec<f64>,
    pub bias: Vec<f64>,
    /// Row-major over weight sets.
    pub weights: Vec<f64>,
}

impl NeuronRecord {
    pub fn weight_sets(&self) -> usize {
        self.bias.len()
    }

    pub fn weights_per_set(&self) -> usize {
        if self.bias.is_empty() {
            0
        } else {
            self.weights.len() / self.bias.len()
        }
    }

    fn to_line(&self) -> String {
        let mut tokens = vec![self.aggregation.to_string(), self.aggregation_coefs.len().to_string()];
        tokens.extend(self.aggregation_coefs.iter().map(f64::to_string));
        tokens.push(self.activation.to_string());
        tokens.push(self.activation_coefs.len().to_string());
        tokens.extend(self.activation_coefs.iter().map(f64::to_string));
        tokens.push(self.bias.len().to_string());
        tokens.extend(self.bias.iter().map(f64::to_string));
        tokens.push(self.weights.len().to_string());
        tokens.extend(self.weights.iter().map(f64::to_string));
        tokens.join(" ")
    }

    fn parse(cursor: &mut Lines<'_>) -> NeuriteResult<Self> {
        let line = cursor.next()?;
        let mut tokens = Tokens {
            tokens: line.split_whitespace().collect(),
            pos: 0,
        };

        let aggregation = tokens.id(cursor)?;
        let aggregation_coefs = tokens.counted(cursor)?;
        let activation = tokens.id(cursor)?;
        let activation_coefs = tokens.counted(cursor)?;
        let bias = tokens.counted(cursor)?;
        let weights = tokens.counted(cursor)?;

        if tokens.pos != tokens.tokens.len() {
            return Err(cursor.error("trailing values after the weights"));
        }
        if bias.is_empty() || weights.len() % bias.len() != 0 {
            return Err(cursor.error(format!(
                "{} weights cannot be split into {} weight sets",
                weights.len(),
                bias.len()
            )));
        }
        Ok(NeuronRecord {
            aggregation,
            aggregation_coefs,
            activation,
            activation_coefs,
            bias,
            weights,
        })
    }
}

struct Tokens<'t> {
    tokens: Vec<&'t str>,
    pos: usize,
}

impl<'t> Tokens<'t> {
    fn next(&mut self, cursor: &Lines<'_>) -> NeuriteResult<&'t str> {
        let token = self
            .tokens
            .get(self.pos)
            .copied()
            .ok_or_else(|| cursor.error("truncated neuron line"))?;
        self.pos += 1;
        Ok(token)
    }

    fn id(&mut self, cursor: &Lines<'_>) -> NeuriteResult<usize> {
        let token = self.next(cursor)?;
        cursor.number(token)
    }

    /// A count followed by that many values.
    fn counted(&mut self, cursor: &Lines<'_>) -> NeuriteResult<Vec<f64>> {
        let n = self.id(cursor)?;
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            let token = self.next(cursor)?;
            values.push(cursor.number(token)?);
        }
        Ok(values)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub neurons: Vec<NeuronRecord>,
}

/// Write all layers to a `.save` file.
pub fn write_layers(path: &Path, layers: &[LayerRecord]) -> NeuriteResult<()> {
    let mut out = String::new();
    for layer in layers {
        out.push_str(&format!("Layer: {}\n", layer.neurons.len()));
        for neuron in &layer.neurons {
            out.push_str(&neuron.to_line());
            out.push('\n');
        }
    }
    fs::write(path, out).map_err(|e| NeuriteError::io(path.display().to_string(), e))?;
    log::info!("wrote {}", path.display());
    Ok(())
}

/// Read layers back in file order.
pub fn read_layers(path: &Path) -> NeuriteResult<Vec<LayerRecord>> {
    let text = fs::read_to_string(path).map_err(|e| NeuriteError::io(path.display().to_string(), e))?;
    let mut cursor = Lines::new(path, &text);
    let mut layers = Vec::new();
    while !cursor.is_done() {
        let header = cursor.next()?;
        if header.trim().is_empty() {
            continue;
        }
        let count: usize = match header.strip_prefix("Layer: ") {
            Some(n) => cursor.number(n)?,
            None => return Err(cursor.error(format!("expected `Layer: <count>`, found `{}`", header))),
        };
        let neurons = (0..count)
            .map(|_| NeuronRecord::parse(&mut cursor))
            .collect::<NeuriteResult<Vec<_>>>()?;
        layers.push(LayerRecord { neurons });
    }
    if layers.is_empty() {
        return Err(cursor.error("no layer found"));
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seed: f64) -> NeuronRecord {
        NeuronRecord {
            aggregation: 2,
            aggregation_coefs: vec![],
            activation: 4,
            activation_coefs: vec![0.01],
            bias: vec![seed, -seed],
            weights: vec![0.1 * seed, 1.0 / 3.0, -2.5e-17, seed, 7.0, f64::MIN_POSITIVE],
        }
    }

    #[test]
    fn test_layers_round_trip_exactly() {
        let layers = vec![
            LayerRecord { neurons: vec![record(1.0), record(2.0)] },
            LayerRecord { neurons: vec![record(0.3)] },
        ];
        let path = std::env::temp_dir().join("neurite_io_weights_round_trip.save");
        write_layers(&path, &layers).unwrap();
        let back = read_layers(&path).unwrap();
        assert_eq!(back, layers);
        assert_eq!(back[0].neurons[0].weights_per_set(), 3);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_truncated_line_is_located() {
        let path = std::env::temp_dir().join("neurite_io_weights_truncated.save");
        std::fs::write(&path, "Layer: 1\n0 0 4 1 0.01 1 0.5 3 1.0 2.0\n").unwrap();
        match read_layers(&path).unwrap_err() {
            NeuriteError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other}"),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_layers(Path::new("/definitely/not/here.save")).unwrap_err();
        assert!(err.is_configuration());
    }
}
