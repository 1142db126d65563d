use std::collections::HashMap;

pub type PointId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointOrigin {
    Sampled,
    Refined,
    Polished,
}

/// One evaluated constitution of one phase.
///
/// `site_fractions` are in the phase's active layout; `phase` indexes the
/// candidate phase list of the calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePoint {
    pub phase: usize,
    pub site_fractions: Vec<f64>,
    pub energy: f64,
    pub composition: Vec<f64>,
    pub origin: PointOrigin,
}

/// Neighbour cells are searched only up to this many coordinates (3^d lookups).
const MAX_NEIGHBOUR_DIMENSION: usize = 6;

/// Spatial hash over quantised coordinates for near-duplicate detection.
///
/// With the cell edge equal to the tolerance, any point within tolerance
/// (max-norm) of a query lies in the query's cell or an adjacent one. Above
/// [`MAX_NEIGHBOUR_DIMENSION`] only the query's own cell is searched.
#[derive(Debug, Clone)]
pub struct QuantizedIndex {
    cell: f64,
    cells: HashMap<Vec<i64>, Vec<(PointId, Vec<f64>)>>,
}

impl QuantizedIndex {
    pub fn new(cell: f64) -> Self {
        Self {
            cell,
            cells: HashMap::new(),
        }
    }

    fn key(&self, coords: &[f64]) -> Vec<i64> {
        coords
            .iter()
            .map(|c| (c / self.cell).floor() as i64)
            .collect()
    }

    pub fn insert(&mut self, coords: &[f64], id: PointId) {
        let key = self.key(coords);
        self.cells
            .entry(key)
            .or_default()
            .push((id, coords.to_vec()));
    }

    /// The first indexed point within `self.cell` of `coords` in max-norm.
    pub fn find_near(&self, coords: &[f64]) -> Option<PointId> {
        let key = self.key(coords);
        let near = |entries: &Vec<(PointId, Vec<f64>)>| {
            entries.iter().find_map(|(id, other)| {
                let distance = coords
                    .iter()
                    .zip(other)
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                (distance < self.cell).then_some(*id)
            })
        };

        if coords.len() > MAX_NEIGHBOUR_DIMENSION {
            return self.cells.get(&key).and_then(near);
        }

        let offsets = 3usize.pow(coords.len() as u32);
        let mut neighbour = key.clone();
        for code in 0..offsets {
            let mut rest = code;
            for (slot, base) in neighbour.iter_mut().zip(&key) {
                *slot = base + (rest % 3) as i64 - 1;
                rest /= 3;
            }
            if let Some(id) = self.cells.get(&neighbour).and_then(near) {
                return Some(id);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Append-only store of every candidate point of a calculation.
///
/// Point ids are positions in insertion order and never change.
#[derive(Debug, Clone)]
pub struct PointStore {
    points: Vec<CandidatePoint>,
    indices: Vec<QuantizedIndex>,
    resolution: f64,
}

impl PointStore {
    pub fn new(phase_count: usize, resolution: f64) -> Self {
        Self {
            points: Vec::new(),
            indices: (0..phase_count)
                .map(|_| QuantizedIndex::new(resolution))
                .collect(),
            resolution,
        }
    }

    fn index_for(&mut self, phase: usize) -> &mut QuantizedIndex {
        if phase >= self.indices.len() {
            let resolution = self.resolution;
            self.indices
                .resize_with(phase + 1, || QuantizedIndex::new(resolution));
        }
        &mut self.indices[phase]
    }

    /// Appends a point unconditionally.
    pub fn push(&mut self, point: CandidatePoint) -> PointId {
        let id = self.points.len();
        self.index_for(point.phase).insert(&point.site_fractions, id);
        self.points.push(point);
        id
    }

    /// Appends a point unless a point of the same phase lies within the store's
    /// resolution of it.
    pub fn push_if_distinct(&mut self, point: CandidatePoint) -> Option<PointId> {
        let duplicate = self
            .indices
            .get(point.phase)
            .and_then(|index| index.find_near(&point.site_fractions));
        match duplicate {
            Some(_) => None,
            None => Some(self.push(point)),
        }
    }

    pub fn get(&self, id: PointId) -> Option<&CandidatePoint> {
        self.points.get(id)
    }

    pub fn points(&self) -> &[CandidatePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn count_by_origin(&self, origin: PointOrigin) -> usize {
        self.points.iter().filter(|p| p.origin == origin).count()
    }
}
