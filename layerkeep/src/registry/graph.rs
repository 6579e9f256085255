//! Dependency graph walks over registered layers.

use std::collections::{HashMap, HashSet};

use crate::types::LayerDescriptor;

/// Finds a dependency path from any of `start`'s dependencies back to
/// `start` itself.
///
/// Unregistered dependencies are skipped. Returns the cycle as a path that
/// begins and ends with `start`.
pub(crate) fn find_cycle(
    start: &LayerDescriptor,
    layers: &HashMap<String, LayerDescriptor>,
) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut path = vec![start.id.clone()];
    if walk(&start.id, &start.dependencies, layers, &mut visited, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn walk(
    target: &str,
    dependencies: &[String],
    layers: &HashMap<String, LayerDescriptor>,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    for dependency in dependencies {
        path.push(dependency.clone());
        if dependency == target {
            return true;
        }
        if visited.insert(dependency.clone()) {
            if let Some(layer) = layers.get(dependency) {
                if walk(target, &layer.dependencies, layers, visited, path) {
                    return true;
                }
            }
        }
        path.pop();
    }
    false
}

/// Orders layers so every dependency comes before its dependents.
///
/// Layers caught in a cycle, and their dependents, are appended at the end
/// in input order so registration can report them.
pub(crate) fn dependency_order(layers: &[LayerDescriptor]) -> Vec<&LayerDescriptor> {
    let by_id: HashMap<&str, &LayerDescriptor> =
        layers.iter().map(|l| (l.id.as_str(), l)).collect();
    let mut ordered: Vec<&LayerDescriptor> = Vec::with_capacity(layers.len());
    let mut placed: HashSet<&str> = HashSet::new();
    let mut in_progress: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        layer: &'a LayerDescriptor,
        by_id: &HashMap<&str, &'a LayerDescriptor>,
        placed: &mut HashSet<&'a str>,
        in_progress: &mut HashSet<&'a str>,
        ordered: &mut Vec<&'a LayerDescriptor>,
    ) -> bool {
        if placed.contains(layer.id.as_str()) {
            return true;
        }
        if !in_progress.insert(layer.id.as_str()) {
            return false;
        }
        let mut complete = true;
        for dependency in &layer.dependencies {
            if let Some(dep) = by_id.get(dependency.as_str()) {
                complete &= visit(dep, by_id, placed, in_progress, ordered);
            }
        }
        in_progress.remove(layer.id.as_str());
        if complete {
            placed.insert(layer.id.as_str());
            ordered.push(layer);
        }
        complete
    }

    for layer in layers {
        visit(layer, &by_id, &mut placed, &mut in_progress, &mut ordered);
    }
    for layer in layers {
        if !placed.contains(layer.id.as_str()) {
            ordered.push(layer);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LayerCategory;

    fn layer(id: &str, deps: &[&str]) -> LayerDescriptor {
        deps.iter().fold(
            LayerDescriptor::new(id, id, LayerCategory::Data),
            |l, d| l.with_dependency(*d),
        )
    }

    fn registered(layers: &[LayerDescriptor]) -> HashMap<String, LayerDescriptor> {
        layers.iter().map(|l| (l.id.clone(), l.clone())).collect()
    }

    #[test]
    fn test_no_cycle() {
        let layers = registered(&[layer("a", &[]), layer("b", &["a"])]);
        assert_eq!(find_cycle(&layer("c", &["b"]), &layers), None);
    }

    #[test]
    fn test_cycle_path() {
        let layers = registered(&[layer("a", &["c"]), layer("b", &["a"])]);
        let cycle = find_cycle(&layer("c", &["b"]), &layers).unwrap();
        assert_eq!(cycle, vec!["c", "b", "a", "c"]);
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let cycle = find_cycle(&layer("a", &["a"]), &HashMap::new()).unwrap();
        assert_eq!(cycle, vec!["a", "a"]);
    }

    #[test]
    fn test_dependency_order() {
        let layers = vec![layer("labels", &["roads"]), layer("roads", &["base"]), layer("base", &[])];
        let ids: Vec<&str> = dependency_order(&layers)
            .iter()
            .map(|l| l.id.as_str())
            .collect();
        assert_eq!(ids, vec!["base", "roads", "labels"]);
    }

    #[test]
    fn test_dependency_order_keeps_cycles_at_end() {
        let layers = vec![layer("x", &["y"]), layer("y", &["x"]), layer("z", &[])];
        let ids: Vec<&str> = dependency_order(&layers)
            .iter()
            .map(|l| l.id.as_str())
            .collect();
        assert_eq!(ids, vec!["z", "x", "y"]);
    }
}
