//! Tensor layouts, grouping, and scale broadcasting
//!
//! Scales are computed on a 2-D *variable layout* `[rows, features]`:
//!
//! - **Flat** `[B, D]`: used as-is.
//! - **AttentionHeads** `[B, H, S, D]`: heads are folded into the feature axis,
//!   `[B, H, S, D] -> [B, S, H, D] -> [B*S, H*D]`.
//!
//! Each row is cut into contiguous groups of `group_size` features. After the
//! per-group scales are computed they have to be laid back out against the
//! original tensor, which for the attention layout means working out whether a
//! group sits inside one head or spans several.

use super::config::GroupSize;
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, Array3, ArrayD, ArrayView2, IxDyn};

const HEADS_TO_SEQ: [usize; 4] = [0, 2, 1, 3];

/// Tensor layouts accepted by the quantizers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// `[Batch, Features]`
    Flat { batch: usize, features: usize },
    /// `[Batch, Head, Seq, HeadDim]`
    AttentionHeads {
        batch: usize,
        heads: usize,
        seq: usize,
        head_dim: usize,
    },
}

impl Layout {
    /// Detect the layout from a tensor shape
    pub fn of(shape: &[usize]) -> Result<Self> {
        match *shape {
            [batch, features] => Ok(Layout::Flat { batch, features }),
            [batch, heads, seq, head_dim] => Ok(Layout::AttentionHeads {
                batch,
                heads,
                seq,
                head_dim,
            }),
            _ => Err(Error::UnsupportedRank(shape.len())),
        }
    }

    /// Original tensor shape
    pub fn shape(&self) -> Vec<usize> {
        match *self {
            Layout::Flat { batch, features } => vec![batch, features],
            Layout::AttentionHeads {
                batch,
                heads,
                seq,
                head_dim,
            } => vec![batch, heads, seq, head_dim],
        }
    }

    /// Rows of the variable layout
    pub fn rows(&self) -> usize {
        match *self {
            Layout::Flat { batch, .. } => batch,
            Layout::AttentionHeads { batch, seq, .. } => batch * seq,
        }
    }

    /// Feature width of the variable layout (`D`, or `H*D` for attention)
    pub fn features(&self) -> usize {
        match *self {
            Layout::Flat { features, .. } => features,
            Layout::AttentionHeads {
                heads, head_dim, ..
            } => heads * head_dim,
        }
    }

    /// Number of scale groups per row
    ///
    /// Fails when `group_size` does not evenly divide the feature width.
    pub fn groups(&self, group_size: GroupSize) -> Result<usize> {
        let features = self.features();
        match group_size {
            GroupSize::Whole => Ok(1),
            GroupSize::Size(g) if g > 0 && features % g == 0 => Ok(features / g),
            GroupSize::Size(g) => Err(Error::MisalignedGroups {
                features,
                group_size: g,
            }),
        }
    }

    /// Elements per group
    pub fn group_width(&self, group_size: GroupSize) -> usize {
        match group_size {
            GroupSize::Whole => self.features(),
            GroupSize::Size(g) => g,
        }
    }

    /// Same layout with a different leading batch dimension
    fn with_batch(self, batch: usize) -> Self {
        match self {
            Layout::Flat { features, .. } => Layout::Flat { batch, features },
            Layout::AttentionHeads {
                heads,
                seq,
                head_dim,
                ..
            } => Layout::AttentionHeads {
                batch,
                heads,
                seq,
                head_dim,
            },
        }
    }

    /// Reshape a tensor of this layout into `[rows, features]`
    pub fn to_rows(&self, x: &ArrayD<f32>) -> Result<Array2<f32>> {
        check_shape(&self.shape(), x.shape())?;
        let rows = match self {
            Layout::Flat { .. } => x.to_owned(),
            Layout::AttentionHeads { .. } => x
                .view()
                .permuted_axes(IxDyn(&HEADS_TO_SEQ))
                .as_standard_layout()
                .into_owned(),
        };
        into_shape(rows, &[self.rows(), self.features()])
            .and_then(|a| into_fixed::<ndarray::Ix2>(a, &[self.rows(), self.features()]))
    }

    /// Inverse of [`Layout::to_rows`]
    pub fn from_rows(&self, rows: ArrayView2<'_, f32>) -> Result<ArrayD<f32>> {
        check_shape(&[self.rows(), self.features()], rows.shape())?;
        let flat = rows.as_standard_layout().into_owned().into_dyn();
        match *self {
            Layout::Flat { .. } => into_shape(flat, &self.shape()),
            Layout::AttentionHeads {
                batch,
                heads,
                seq,
                head_dim,
            } => {
                let seq_major = into_shape(flat, &[batch, seq, heads, head_dim])?;
                Ok(seq_major
                    .permuted_axes(IxDyn(&HEADS_TO_SEQ))
                    .as_standard_layout()
                    .into_owned())
            }
        }
    }

    /// Grouped samples `[rows, groups, group_width]` for calibration
    pub fn group_rows(&self, x: &ArrayD<f32>, group_size: GroupSize) -> Result<Array3<f32>> {
        let groups = self.groups(group_size)?;
        let width = self.group_width(group_size);
        let rows = self.to_rows(x)?;
        let shape = [self.rows(), groups, width];
        into_shape(rows.into_dyn(), &shape).and_then(|a| into_fixed::<ndarray::Ix3>(a, &shape))
    }

    /// Grouped blocks `[1, blocks, group_width]` for per-call scales
    ///
    /// Every row contributes its own groups; with [`GroupSize::Whole`] the
    /// entire tensor is a single block.
    pub fn group_blocks(&self, x: &ArrayD<f32>, group_size: GroupSize) -> Result<Array3<f32>> {
        let rows = self.to_rows(x)?;
        let total = rows.len();
        let shape = match group_size {
            GroupSize::Whole => [1, 1, total],
            GroupSize::Size(g) => {
                let groups = self.groups(group_size)?;
                [1, self.rows() * groups, g]
            }
        };
        into_shape(rows.into_dyn(), &shape).and_then(|a| into_fixed::<ndarray::Ix3>(a, &shape))
    }

    /// Expand per-block scales from [`Layout::group_blocks`] to the full tensor shape.
    pub fn expand_blocks(&self, scale: &Array1<f32>, group_size: GroupSize) -> Result<ArrayD<f32>> {
        let total = self.rows() * self.features();
        let per_block = match group_size {
            GroupSize::Whole => total,
            GroupSize::Size(g) => g,
        };
        if scale.len() * per_block != total {
            return Err(Error::ShapeMismatch {
                expected: vec![total / per_block.max(1)],
                got: vec![scale.len()],
            });
        }

        let tiled: Vec<f32> = scale
            .iter()
            .flat_map(|&s| std::iter::repeat(s).take(per_block))
            .collect();
        let rows = Array2::from_shape_vec((self.rows(), self.features()), tiled)
            .map_err(|_| shape_error(&[self.rows(), self.features()], &[total]))?;
        self.from_rows(rows.view())
    }

    /// Broadcastable static scale for per-group scales `[G]`
    ///
    /// - Flat: `[1, D]`, each group's scale repeated over its features.
    /// - Attention, more groups than heads: `[1, H, 1, D]`, several groups
    ///   inside every head.
    /// - Attention, at most as many groups as heads: `[1, H, 1, 1]`, each
    ///   group covering `H / G` whole heads.
    /// - A single group: all-ones shape of the tensor's rank.
    pub fn broadcast_scale(&self, scale: &Array1<f32>) -> Result<ArrayD<f32>> {
        let groups = scale.len();
        if groups == 0 {
            return Err(Error::InvalidParameter("empty scale vector".to_string()));
        }

        if groups == 1 {
            let ones = vec![1; self.shape().len()];
            return Ok(ArrayD::from_elem(IxDyn(&ones), scale[0]));
        }

        match *self {
            Layout::Flat { features, .. } => {
                if features % groups != 0 {
                    return Err(Error::MisalignedGroups {
                        features,
                        group_size: features / groups,
                    });
                }
                let width = features / groups;
                let tiled = scale
                    .view()
                    .into_shape((groups, 1))
                    .map_err(|_| shape_error(&[groups, 1], &[groups]))?
                    .broadcast((groups, width))
                    .ok_or_else(|| shape_error(&[groups, width], &[groups, 1]))?
                    .to_owned();
                into_shape(tiled.into_dyn(), &[1, features])
            }
            Layout::AttentionHeads {
                heads, head_dim, ..
            } => {
                if groups > heads {
                    if groups % heads != 0 {
                        return Err(Error::HeadGroupMismatch { heads, groups });
                    }
                    let per_head = groups / heads;
                    let width = head_dim / per_head;
                    let tiled = scale
                        .view()
                        .into_shape((heads, per_head, 1))
                        .map_err(|_| shape_error(&[heads, per_head, 1], &[groups]))?
                        .broadcast((heads, per_head, width))
                        .ok_or_else(|| shape_error(&[heads, per_head, width], &[heads, per_head, 1]))?
                        .to_owned();
                    into_shape(tiled.into_dyn(), &[1, heads, 1, head_dim])
                } else {
                    if heads % groups != 0 {
                        return Err(Error::HeadGroupMismatch { heads, groups });
                    }
                    let span = heads / groups;
                    let tiled = scale
                        .view()
                        .into_shape((groups, 1))
                        .map_err(|_| shape_error(&[groups, 1], &[groups]))?
                        .broadcast((groups, span))
                        .ok_or_else(|| shape_error(&[groups, span], &[groups, 1]))?
                        .to_owned();
                    into_shape(tiled.into_dyn(), &[1, heads, 1, 1])
                }
            }
        }
    }

    /// Layout of the concatenation of several samples along the batch axis
    pub fn concat(samples: &[ArrayD<f32>]) -> Result<(Self, ArrayD<f32>)> {
        let first = samples
            .first()
            .ok_or_else(|| Error::InvalidParameter("no samples to concatenate".to_string()))?;
        let layout = Layout::of(first.shape())?;

        let views: Vec<_> = samples.iter().map(|s| s.view()).collect();
        for view in &views {
            if view.shape()[1..] != first.shape()[1..] {
                return Err(shape_error(first.shape(), view.shape()));
            }
        }
        let full = ndarray::concatenate(ndarray::Axis(0), &views)
            .map_err(|_| shape_error(first.shape(), &[]))?;
        let batch = full.shape()[0];
        Ok((layout.with_batch(batch), full))
    }
}

fn shape_error(expected: &[usize], got: &[usize]) -> Error {
    Error::ShapeMismatch {
        expected: expected.to_vec(),
        got: got.to_vec(),
    }
}

fn check_shape(expected: &[usize], got: &[usize]) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(shape_error(expected, got))
    }
}

fn into_shape(x: ArrayD<f32>, shape: &[usize]) -> Result<ArrayD<f32>> {
    let got = x.shape().to_vec();
    let x = if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    };
    x.into_shape(IxDyn(shape))
        .map_err(|_| shape_error(shape, &got))
}

fn into_fixed<D: ndarray::Dimension>(
    x: ArrayD<f32>,
    shape: &[usize],
) -> Result<ndarray::Array<f32, D>> {
    let got = x.shape().to_vec();
    x.into_dimensionality::<D>()
        .map_err(|_| shape_error(shape, &got))
}
