use std::cmp::Ordering;

use nalgebra::{convert, RealField, Vector3, Vector4};

use crate::ResultSet;

const LEAF_SIZE: usize = 8;

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum Node<T> {
    /// A range into the permuted index list.
    Leaf { start: usize, end: usize },
    Branch {
        children: [usize; 2],
        dim: usize,
        value: T,
    },
}

/// The dimension of largest variance among `indices`.
fn cut_dim<T: RealField + Copy>(coords: &[&Vector4<T>], indices: &[usize]) -> usize {
    let sum = { indices.iter() }
        .map(|&i| coords[i].xyz())
        .fold(Vector3::zeros(), |acc, coord| acc + coord);
    let mean = sum / convert::<_, T>(indices.len() as f64);

    let var = { indices.iter() }
        .map(|&i| coords[i].xyz())
        .fold(Vector3::zeros(), |acc, coord| {
            let diff = coord - mean;
            acc + diff.component_mul(&diff)
        });
    var.imax()
}

pub(crate) fn build<T: RealField + Copy>(
    nodes: &mut Vec<Node<T>>,
    coords: &[&Vector4<T>],
    indices: &mut [usize],
    start: usize,
) -> usize {
    let node = if indices.len() <= LEAF_SIZE {
        Node::Leaf {
            start,
            end: start + indices.len(),
        }
    } else {
        let dim = cut_dim(coords, indices);
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            coords[a][dim]
                .partial_cmp(&coords[b][dim])
                .unwrap_or(Ordering::Equal)
        });
        let value = coords[indices[mid]][dim];

        let (left, right) = indices.split_at_mut(mid);
        let left = build(nodes, coords, left, start);
        let right = build(nodes, coords, right, start + mid);
        Node::Branch {
            children: [left, right],
            dim,
            value,
        }
    };
    nodes.push(node);
    nodes.len() - 1
}

pub(crate) fn search<T: RealField + Copy>(
    nodes: &[Node<T>],
    node: usize,
    coords: &[&Vector4<T>],
    indices: &[usize],
    pivot: &Vector4<T>,
    result: &mut impl ResultSet<T>,
) {
    match nodes[node] {
        Node::Leaf { start, end } => {
            for &index in &indices[start..end] {
                let distance = (coords[index].xyz() - pivot.xyz()).norm_squared();
                result.push(distance, index);
            }
        }
        Node::Branch {
            children: [left, right],
            dim,
            value,
        } => {
            let diff = pivot[dim] - value;
            let (near, far) = if diff < T::zero() {
                (left, right)
            } else {
                (right, left)
            };

            search(nodes, near, coords, indices, pivot, result);
            if result.worst().map_or(true, |worst| diff * diff <= worst) {
                search(nodes, far, coords, indices, pivot, result);
            }
        }
    }
}
