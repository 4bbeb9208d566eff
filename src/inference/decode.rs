use crate::config::ExtraColumn;
use crate::error::InferenceError;

/// A scored box in input space, before mapping and suppression
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub class_id: u32,
    pub confidence: f32,
}

/// Turns a raw detection-head tensor into thresholded candidates.
///
/// Accepts `(boxes, attributes)` or `(attributes, boxes)` with any number of
/// leading unit dimensions. Attributes are `cx, cy, w, h` in input pixels
/// followed by one score per class, with an optional extra column governed
/// by [`ExtraColumn`].
#[derive(Debug, Clone)]
pub struct OutputDecoder {
    pub num_classes: usize,
    pub extra_column: ExtraColumn,
    pub score_threshold: f32,
}

/// Where the class scores sit within one box's attributes
#[derive(Debug, Clone, Copy)]
struct Columns {
    width: usize,
    objectness: Option<usize>,
    first_class: usize,
}

impl OutputDecoder {
    pub fn new(num_classes: usize, extra_column: ExtraColumn, score_threshold: f32) -> Self {
        Self {
            num_classes,
            extra_column,
            score_threshold,
        }
    }

    fn conventional_width(&self) -> usize {
        4 + self.num_classes
    }

    /// Column layout for a given attribute count, if it is acceptable
    fn columns(&self, width: usize) -> Option<Columns> {
        let conventional = self.conventional_width();
        match self.extra_column {
            ExtraColumn::None if width == conventional => Some(Columns {
                width,
                objectness: None,
                first_class: 4,
            }),
            // A single trailing column is dropped
            ExtraColumn::Auto if width == conventional || width == conventional + 1 => {
                Some(Columns {
                    width,
                    objectness: None,
                    first_class: 4,
                })
            }
            ExtraColumn::Objectness if width == conventional + 1 => Some(Columns {
                width,
                objectness: Some(4),
                first_class: 5,
            }),
            _ => None,
        }
    }

    pub fn decode(&self, shape: &[usize], data: &[f32]) -> Result<Vec<Candidate>, InferenceError> {
        let shape_error = || InferenceError::OutputShape {
            shape: shape.to_vec(),
            expected: self.conventional_width(),
        };

        let dims: Vec<usize> = {
            let first_real = shape.iter().position(|&d| d != 1).unwrap_or(shape.len());
            let mut dims = shape[first_real..].to_vec();
            while dims.len() < 2 {
                dims.insert(0, 1);
            }
            dims
        };
        if dims.len() != 2 || dims[0] * dims[1] != data.len() {
            return Err(shape_error());
        }
        let (rows, cols) = (dims[0], dims[1]);

        // YOLOv8 heads emit attributes first; prefer that reading when both fit
        let (boxes, columns, transposed) = match (self.columns(rows), self.columns(cols)) {
            (Some(columns), _) => (cols, columns, true),
            (None, Some(columns)) => (rows, columns, false),
            (None, None) => return Err(shape_error()),
        };

        let at = |box_index: usize, attribute: usize| -> f32 {
            if transposed {
                data[attribute * boxes + box_index]
            } else {
                data[box_index * columns.width + attribute]
            }
        };

        let mut candidates = Vec::new();
        for i in 0..boxes {
            let (class_id, score) = (0..self.num_classes)
                .map(|c| (c, at(i, columns.first_class + c)))
                .fold((0usize, f32::NEG_INFINITY), |best, (c, s)| {
                    if s > best.1 {
                        (c, s)
                    } else {
                        best
                    }
                });

            let confidence = match columns.objectness {
                Some(col) => at(i, col) * score,
                None => score,
            };

            if !confidence.is_finite() || confidence < self.score_threshold {
                continue;
            }

            candidates.push(Candidate {
                cx: at(i, 0),
                cy: at(i, 1),
                w: at(i, 2),
                h: at(i, 3),
                class_id: class_id as u32,
                confidence,
            });
        }

        Ok(candidates)
    }
}
