use crate::models::{Coordinates, Location};

/// Nearest-neighbor ordering of `points` (id, position) starting at index
/// `start`. Equal distances are broken by ascending id. Returns indices into
/// `points` in visiting order.
pub fn nearest_neighbor_order(points: &[(u32, Coordinates)], start: usize) -> Vec<usize> {
    if points.is_empty() {
        return Vec::new();
    }

    let start = start.min(points.len() - 1);
    let mut visited = vec![false; points.len()];
    let mut order = Vec::with_capacity(points.len());
    visited[start] = true;
    order.push(start);

    let mut current = start;
    while order.len() < points.len() {
        let here = points[current].1;
        let next = points
            .iter()
            .enumerate()
            .filter(|(i, _)| !visited[*i])
            .min_by(|(_, (id_a, a)), (_, (id_b, b))| {
                here.distance_to(a)
                    .total_cmp(&here.distance_to(b))
                    .then(id_a.cmp(id_b))
            })
            .map(|(i, _)| i);

        match next {
            Some(i) => {
                visited[i] = true;
                order.push(i);
                current = i;
            }
            None => break,
        }
    }

    order
}

/// Reorder an arbitrary set of locations into a nearest-neighbor tour that
/// starts at the location closest to `reference`.
pub fn order_tour(locations: &[Location], reference: &Coordinates) -> Vec<Location> {
    let points: Vec<(u32, Coordinates)> =
        locations.iter().map(|l| (l.id, l.coordinates)).collect();

    let start = points
        .iter()
        .enumerate()
        .min_by(|(_, (id_a, a)), (_, (id_b, b))| {
            a.distance_to(reference)
                .total_cmp(&b.distance_to(reference))
                .then(id_a.cmp(id_b))
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    nearest_neighbor_order(&points, start)
        .into_iter()
        .map(|i| locations[i].clone())
        .collect()
}
