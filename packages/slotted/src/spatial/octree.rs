//! A loose-root octree over axis-aligned boxes.
//!
//! Elements are stored at the deepest node whose octants do not split their
//! box. Anything straddling a node's centre planes stays at that node, and
//! nodes at or below the minimum leaf size take everything they are given.
//!
//! The tree does not track movement. An element must be removed with the box
//! it was inserted with; a box that has since moved may descend to a
//! different node and the removal will miss. In practice the tree is cleared
//! and rebuilt each tick, which sidesteps the problem entirely.

use glam::{BVec3, Vec3};
use tracing::{debug, error, warn};

use crate::config::OcTreeConfig;
use crate::spatial::Aabb;

/// A visitor used with `OcTree::traverse`.
pub trait TreeProcessor<T> {
    /// Return true to visit the elements of the node with these bounds and
    /// continue into its children.
    fn descend(&mut self, node_bounds: &Aabb) -> bool;

    /// Called for each element stored in a visited node.
    fn process(&mut self, element: &T);
}

struct Node<T> {
    bounds: Aabb,
    elements: Vec<T>,
    children: [Option<Box<Node<T>>>; 8],
}

impl<T> Node<T> {
    fn new(bounds: Aabb) -> Node<T> {
        Node {
            bounds,
            elements: Vec::new(),
            children: Default::default(),
        }
    }

    fn clear(&mut self) {
        self.elements.clear();
        self.children = Default::default();
    }

    fn center(&self) -> Vec3 {
        self.bounds.min + (self.bounds.max - self.bounds.min) * 0.5
    }

    /// Pick the child octant `aabb` belongs in, or `None` if it should be
    /// stored here.
    fn target_child(&self, aabb: &Aabb, min_leaf_size: f32) -> Option<usize> {
        if self.bounds.max.x - self.bounds.min.x <= min_leaf_size {
            return None;
        }

        let center = self.center();
        let straddles = aabb.min.cmplt(center) & aabb.max.cmpgt(center);
        if straddles.any() {
            return None;
        }

        Some(aabb.min.cmpge(center).bitmask() as usize)
    }

    /// The bounds of the child at `index`, covering exactly that octant.
    fn child_bounds(&self, index: usize) -> Aabb {
        let center = self.center();
        let greater = BVec3::new(index & 0b001 != 0, index & 0b010 != 0, index & 0b100 != 0);
        Aabb::new(
            Vec3::select(greater, center, self.bounds.min),
            Vec3::select(greater, self.bounds.max, center),
        )
    }

    fn insert(&mut self, aabb: &Aabb, element: T, min_leaf_size: f32) {
        let mut node = self;
        loop {
            match node.target_child(aabb, min_leaf_size) {
                None => {
                    node.elements.push(element);
                    return;
                }
                Some(index) => {
                    let bounds = node.child_bounds(index);
                    node = &mut **node.children[index]
                        .get_or_insert_with(|| Box::new(Node::new(bounds)));
                }
            }
        }
    }

    fn remove(&mut self, aabb: &Aabb, element: &T, min_leaf_size: f32) -> bool
        where T: PartialEq
    {
        let mut node = self;
        loop {
            match node.target_child(aabb, min_leaf_size) {
                None => {
                    return match node.elements.iter().position(|e| e == element) {
                        Some(idx) => {
                            node.elements.remove(idx);
                            true
                        }
                        None => false,
                    };
                }
                Some(index) => match node.children[index].as_deref_mut() {
                    Some(child) => node = child,
                    None => return false,
                },
            }
        }
    }

    fn traverse<P: TreeProcessor<T> + ?Sized>(&self, processor: &mut P) {
        if !processor.descend(&self.bounds) {
            return;
        }

        for element in self.elements.iter() {
            processor.process(element);
        }

        for child in self.children.iter().flatten() {
            child.traverse(processor);
        }
    }

    fn count_nodes(&self) -> usize {
        1 + self.children.iter()
            .flatten()
            .map(|c| c.count_nodes())
            .sum::<usize>()
    }
}

/// A spatial index over `(Aabb, T)` pairs.
pub struct OcTree<T> {
    root: Box<Node<T>>,
    initial_root: Aabb,
    min_leaf_size: f32,
    len: usize,
}

impl<T> OcTree<T> {
    /// Create a tree with the default configuration.
    pub fn new() -> OcTree<T> {
        OcTree::with_config(&OcTreeConfig::default())
    }

    /// Create a tree from configuration.
    ///
    /// Sizes which are not positive and finite are logged and replaced: the
    /// leaf size by its default and the root by a cube of the leaf size.
    pub fn with_config(config: &OcTreeConfig) -> OcTree<T> {
        let min_leaf_size = if usable_size(config.min_leaf_size) {
            config.min_leaf_size
        } else {
            warn!("octree min_leaf_size {} is unusable, using the default", config.min_leaf_size);
            OcTreeConfig::default().min_leaf_size
        };
        let root_size = if usable_size(config.initial_root_size) {
            config.initial_root_size
        } else {
            warn!("octree root size {} is unusable, using {}", config.initial_root_size, min_leaf_size);
            min_leaf_size
        };
        OcTree::with_parts(Aabb::cube(root_size), min_leaf_size)
    }

    /// Create a tree whose root is a cube of edge `size` centred on the origin.
    pub fn with_root_size(size: f32) -> OcTree<T> {
        OcTree::with_config(&OcTreeConfig {
            initial_root_size: size,
            ..OcTreeConfig::default()
        })
    }

    /// Create a tree with explicit root bounds.
    ///
    /// Root growth doubles the root's x extent, so the root should be a cube.
    /// A root with no x extent, or with non-finite corners, is replaced by a
    /// cube of the minimum leaf size.
    pub fn with_root(root: Aabb) -> OcTree<T> {
        let min_leaf_size = OcTreeConfig::default().min_leaf_size;
        let root = if root.is_finite() && usable_size(root.max.x - root.min.x) {
            root
        } else {
            warn!("octree root {:?} is unusable, using a cube of {}", root, min_leaf_size);
            Aabb::cube(min_leaf_size)
        };
        OcTree::with_parts(root, min_leaf_size)
    }

    fn with_parts(root: Aabb, min_leaf_size: f32) -> OcTree<T> {
        OcTree {
            root: Box::new(Node::new(root)),
            initial_root: root,
            min_leaf_size,
            len: 0,
        }
    }

    /// The current root bounds, including any growth.
    pub fn root_bounds(&self) -> Aabb {
        self.root.bounds
    }

    /// The number of elements in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the tree holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of allocated nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }

    /// Remove every element while keeping the current root size.
    pub fn clear(&mut self) {
        self.root.clear();
        self.len = 0;
    }

    /// Remove every element and restore the initial root bounds.
    pub fn reset(&mut self) {
        self.root = Box::new(Node::new(self.initial_root));
        self.len = 0;
    }

    /// Insert `element` covering `aabb`.
    ///
    /// The root doubles towards the box until it fully contains it. Boxes
    /// which are not finite, or which lie so far out that the root would
    /// overflow before reaching them, are logged and dropped.
    pub fn insert(&mut self, aabb: Aabb, element: T) {
        if !aabb.is_finite() {
            error!("refusing to insert non-finite box {:?} into octree", aabb);
            return;
        }

        while !self.root.bounds.contains_fully(&aabb) {
            if !self.grow_towards(&aabb) {
                error!("octree root {:?} cannot grow to contain {:?}, dropping element",
                    self.root.bounds, aabb);
                return;
            }
        }

        self.root.insert(&aabb, element, self.min_leaf_size);
        self.len += 1;
    }

    /// Remove `element`, which must have been inserted with `aabb`.
    ///
    /// Returns false if it was not found, which is not an error.
    pub fn remove(&mut self, aabb: &Aabb, element: &T) -> bool
        where T: PartialEq
    {
        let removed = self.root.remove(aabb, element, self.min_leaf_size);
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Walk the tree depth-first, pruning wherever `descend` returns false.
    pub fn traverse<P: TreeProcessor<T> + ?Sized>(&self, processor: &mut P) {
        self.root.traverse(processor);
    }

    /// Call `f` for every element stored in a node which intersects `aabb`.
    ///
    /// This is a broad-phase: elements are candidates, not confirmed overlaps.
    pub fn for_each_candidate<F: FnMut(&T)>(&self, aabb: &Aabb, f: F) {
        struct Query<'a, F> {
            aabb: &'a Aabb,
            f: F,
        }

        impl<'a, T, F: FnMut(&T)> TreeProcessor<T> for Query<'a, F> {
            fn descend(&mut self, node_bounds: &Aabb) -> bool {
                node_bounds.intersects(self.aabb)
            }

            fn process(&mut self, element: &T) {
                (self.f)(element)
            }
        }

        self.traverse(&mut Query { aabb, f });
    }

    /// Replace the root with one twice the size, extended towards `aabb`,
    /// keeping the old root as the matching child octant.
    ///
    /// Returns false, leaving the root alone, if the grown root would not be
    /// finite.
    fn grow_towards(&mut self, aabb: &Aabb) -> bool {
        let bounds = self.root.bounds;
        let size = (bounds.max.x - bounds.min.x).max(self.min_leaf_size);
        let mut min = bounds.min;
        let mut max = bounds.max;
        let mut child_index = 0;

        for axis in 0..3 {
            if min[axis] > aabb.min[axis] {
                min[axis] -= size;
                child_index |= 1 << axis;
            } else {
                max[axis] += size;
            }
        }

        let grown = Aabb::new(min, max);
        if !grown.is_finite() || !grown.size().is_finite() {
            return false;
        }

        let new_root = Box::new(Node::new(grown));
        let old_root = std::mem::replace(&mut self.root, new_root);
        self.root.children[child_index] = Some(old_root);
        debug!("grew octree root to {:?}", self.root.bounds);
        true
    }
}

fn usable_size(size: f32) -> bool {
    size.is_finite() && size > 0.0
}

impl<T> Default for OcTree<T> {
    fn default() -> Self {
        OcTree::new()
    }
}
