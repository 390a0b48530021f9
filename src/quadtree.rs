//! Barnes-Hut quadtree: hierarchical spatial aggregation over a rectangular
//! domain, with far-field gravity approximated by node centers of mass.

use glam::Vec2;
use rayon::prelude::*;

use crate::particle::Particle;

/// How many members a leaf can have.
pub const LEAF_MAX_BODIES: usize = 1;

/// Minimum width of a splittable node.
pub const NODE_END_WIDTH: f32 = 1.0;

/// Minimum height of a splittable node.
pub const NODE_END_HEIGHT: f32 = 1.0;

/// How far away from a node's COM a target must be (in node dimensions)
/// before the whole node is treated as a single point mass.
pub const NODE_COM_DIST_F: f32 = 1.5;

/// One node of the tree: a half-open box `[from, to)` with aggregate data
/// and a cached copy of the particles inside it.
#[derive(Debug)]
pub struct Node {
    quad: Option<Box<[Node; 4]>>,
    from: Vec2,
    to: Vec2,
    dims: Vec2,
    com: Vec2,      // center of mass (unweighted mean of member positions)
    mass: f32,      // sum of members' mass
    radius: f32,    // sum of members' radii
    radius_sq: f32, // radius squared
    members: Vec<Particle>,
    is_leaf: bool,
    end: bool, // too small to split further
}

impl Node {
    fn new(from: Vec2, dims: Vec2) -> Self {
        Self {
            quad: None,
            from,
            to: from + dims,
            dims,
            com: Vec2::ZERO,
            mass: 0.0,
            radius: 0.0,
            radius_sq: 0.0,
            members: Vec::new(),
            is_leaf: true,
            end: dims.x < NODE_END_WIDTH || dims.y < NODE_END_HEIGHT,
        }
    }

    /// The four children carved by the parent's midpoint: UL, UR, LL, LR.
    fn new_quad(parent_from: Vec2, parent_dims: Vec2) -> Box<[Node; 4]> {
        let dims = parent_dims * 0.5;
        Box::new([
            Node::new(parent_from, dims),
            Node::new(parent_from + Vec2::new(dims.x, 0.0), dims),
            Node::new(parent_from + Vec2::new(0.0, dims.y), dims),
            Node::new(parent_from + dims, dims),
        ])
    }

    fn contains(&self, pos: Vec2) -> bool {
        pos.x >= self.from.x && pos.x < self.to.x && pos.y >= self.from.y && pos.y < self.to.y
    }

    /// Rebuild this subtree from the parent's member list.
    fn update(&mut self, parent_members: &[Particle]) {
        self.com = Vec2::ZERO;
        self.mass = 0.0;
        self.radius = 0.0;
        self.is_leaf = true;
        self.members.clear();

        let mut com = Vec2::ZERO;
        for p in parent_members {
            if self.contains(p.pos) {
                self.members.push(*p);
                com += p.pos;
                self.mass += p.mass;
                self.radius += p.radius;
            }
        }

        if !self.members.is_empty() {
            self.com = com / self.members.len() as f32;
            self.radius_sq = self.radius * self.radius;
        }

        if !self.end && self.members.len() > LEAF_MAX_BODIES {
            self.is_leaf = false;
            let quad = self
                .quad
                .get_or_insert_with(|| Node::new_quad(self.from, self.dims));

            for node in quad.iter_mut() {
                node.update(&self.members);
            }
        }
    }

    /// Apply this subtree's gravity to `target`.
    fn apply_gravity(&self, target: &mut Particle) {
        if self.members.is_empty() {
            return;
        }
        if self.members.len() == 1 {
            target.apply_gravity(self.com, self.mass, 0.0);
            return;
        }

        let min = self.dims * NODE_COM_DIST_F;
        let d = self.com - target.pos;

        if d.x.abs() > min.x && d.y.abs() > min.y && d.length_squared() > self.radius_sq {
            // target is sufficiently far away: the whole node acts as a
            // point mass at its COM
            target.apply_gravity(self.com, self.mass, 0.0);
        } else if self.is_leaf {
            for p in &self.members {
                target.apply_gravity(p.pos, p.mass, p.radius);
            }
        } else {
            for node in self.quad.as_ref().unwrap().iter() {
                node.apply_gravity(target);
            }
        }
    }

    /// Nested quad, if this node has been split.
    pub fn children(&self) -> Option<&[Node; 4]> {
        if self.is_leaf {
            None
        } else {
            self.quad.as_deref()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn bounds(&self) -> (Vec2, Vec2) {
        (self.from, self.to)
    }

    pub fn members(&self) -> &[Particle] {
        &self.members
    }

    pub fn center_of_mass(&self) -> Vec2 {
        self.com
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }
}

/// A quadtree over the half-open box `[from, to)`.
///
/// The top-level quad is carved once at creation; [`Quadtree::update`]
/// rebuilds membership and aggregates in place, reusing the member vectors
/// of previous updates.
#[derive(Debug)]
pub struct Quadtree {
    quad: Box<[Node; 4]>,
    from: Vec2,
    dims: Vec2,
    members: Vec<Particle>,
}

impl Quadtree {
    pub fn new(from: Vec2, to: Vec2) -> Self {
        let dims = to - from;
        Self {
            quad: Node::new_quad(from, dims),
            from,
            dims,
            members: Vec::new(),
        }
    }

    pub fn bounds(&self) -> (Vec2, Vec2) {
        (self.from, self.from + self.dims)
    }

    /// Whether `pos` lies inside the tree's box.
    pub fn contains(&self, pos: Vec2) -> bool {
        let to = self.from + self.dims;
        pos.x >= self.from.x && pos.x < to.x && pos.y >= self.from.y && pos.y < to.y
    }

    /// Rebuild the tree from the given particle array. The four top-level
    /// quadrants update in parallel; recursion inside a quadrant is
    /// sequential, so each subtree is owned by one worker.
    pub fn update(&mut self, particles: &[Particle]) {
        self.members.clear();
        self.members.extend_from_slice(particles);

        let members = &self.members;
        self.quad.par_iter_mut().for_each(|node| node.update(members));
    }

    /// Walk the tree read-only and accumulate gravity into `target.acc`.
    pub fn apply_gravity(&self, target: &mut Particle) {
        for node in self.quad.iter() {
            node.apply_gravity(target);
        }
    }

    /// The four top-level quadrants: UL, UR, LL, LR.
    pub fn quadrants(&self) -> &[Node; 4] {
        &self.quad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FROM: Vec2 = Vec2::ZERO;
    const TO: Vec2 = Vec2::new(10.0, 10.0);

    fn body(x: f32, y: f32) -> Particle {
        Particle::new(Vec2::new(x, y), 1.0, 2.0)
    }

    #[test]
    fn empty_tree_is_noop_on_walk() {
        let mut tree = Quadtree::new(FROM, TO);
        tree.update(&[]);

        let mut target = body(5.0, 5.0);
        tree.apply_gravity(&mut target);
        assert_eq!(target.acc, Vec2::ZERO);
    }

    #[test]
    fn quadrant_split() {
        // One particle per corner: every top-level quadrant ends up with a
        // single leaf member and no nested quad.
        let few = [body(1.0, 1.0), body(9.0, 1.0), body(1.0, 9.0), body(9.0, 9.0)];

        let mut tree = Quadtree::new(FROM, TO);
        tree.update(&few);

        for node in tree.quadrants() {
            assert!(!node.is_empty());
            assert_eq!(node.members().len(), 1);
            assert!(node.children().is_none());
        }
    }

    #[test]
    fn clustered_split() {
        // Two particles per corner: every quadrant exceeds LEAF_MAX_BODIES
        // and splits into a nested quad.
        let many = [
            body(1.0, 1.0),
            body(2.0, 2.0),
            body(9.0, 1.0),
            body(8.0, 2.0),
            body(1.0, 9.0),
            body(2.0, 8.0),
            body(9.0, 9.0),
            body(8.0, 8.0),
        ];

        let mut tree = Quadtree::new(FROM, TO);
        tree.update(&many);

        for node in tree.quadrants() {
            assert_eq!(node.members().len(), 2);
            assert!(node.children().is_some());
        }
    }

    #[test]
    fn apply_gravity_pulls_corners_inward() {
        let mut bodies = [body(1.0, 1.0), body(9.0, 1.0), body(1.0, 9.0), body(9.0, 9.0)];

        let mut tree = Quadtree::new(FROM, TO);
        tree.update(&bodies);
        for b in bodies.iter_mut() {
            tree.apply_gravity(b);
        }

        assert!(bodies[0].acc.x > 0.0 && bodies[0].acc.y > 0.0);
        assert!(bodies[1].acc.x < 0.0 && bodies[1].acc.y > 0.0);
        assert!(bodies[2].acc.x > 0.0 && bodies[2].acc.y < 0.0);
        assert!(bodies[3].acc.x < 0.0 && bodies[3].acc.y < 0.0);
    }

    #[test]
    fn update_grows_and_shrinks_with_input() {
        let mut tree = Quadtree::new(FROM, TO);

        let many: Vec<Particle> = (0..64)
            .map(|i| body((i % 8) as f32 + 0.5, (i / 8) as f32 + 0.5))
            .collect();
        tree.update(&many);
        let total: usize = tree.quadrants().iter().map(|n| n.members().len()).sum();
        assert_eq!(total, 64);

        tree.update(&[body(1.0, 1.0)]);
        let total: usize = tree.quadrants().iter().map(|n| n.members().len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn aggregates_match_members() {
        let bodies = [
            body(1.0, 1.0),
            body(2.0, 3.0),
            Particle::new(Vec2::new(4.0, 1.0), 3.0, 0.5),
        ];

        let mut tree = Quadtree::new(FROM, TO);
        tree.update(&bodies);

        // All three live in the upper-left quadrant.
        let ul = &tree.quadrants()[0];
        assert_eq!(ul.members().len(), 3);
        assert!((ul.mass() - 5.0).abs() < 1e-6);

        let mean = (Vec2::new(1.0, 1.0) + Vec2::new(2.0, 3.0) + Vec2::new(4.0, 1.0)) / 3.0;
        assert!((ul.center_of_mass() - mean).length() < 1e-6);
    }

    #[test]
    fn membership_respects_half_open_boxes() {
        // A particle exactly on the midline belongs to the right/lower
        // quadrant, never both.
        let on_seam = [body(5.0, 5.0)];

        let mut tree = Quadtree::new(FROM, TO);
        tree.update(&on_seam);

        let counts: Vec<usize> = tree
            .quadrants()
            .iter()
            .map(|n| n.members().len())
            .collect();
        assert_eq!(counts, vec![0, 0, 0, 1]); // LR quadrant
    }

    #[test]
    fn terminal_node_keeps_excess_members() {
        // A box smaller than NODE_END_WIDTH cannot split, so its node holds
        // more than LEAF_MAX_BODIES members and stays a leaf.
        let mut tree = Quadtree::new(Vec2::ZERO, Vec2::new(1.5, 1.5));
        let crowd = [
            Particle::new(Vec2::new(0.1, 0.1), 1.0, 0.1),
            Particle::new(Vec2::new(0.2, 0.2), 1.0, 0.1),
            Particle::new(Vec2::new(0.3, 0.3), 1.0, 0.1),
        ];
        tree.update(&crowd);

        let ul = &tree.quadrants()[0];
        assert_eq!(ul.members().len(), 3);
        assert!(ul.children().is_none());
    }
}
