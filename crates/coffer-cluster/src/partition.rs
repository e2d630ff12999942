//! Bucket-to-cluster assignment across the ensemble.

use crate::hash::murmur3_32;

/// Picks the cluster owning `bucket` from a name-sorted cluster list.
///
/// Every node of every cluster runs this over the same sorted list, so the
/// whole ensemble agrees on which cluster owns a bucket. `None` only for an
/// empty list.
pub fn cluster_for<'a>(sorted_clusters: &'a [String], bucket: &str) -> Option<&'a str> {
    if sorted_clusters.is_empty() {
        return None;
    }
    let index = murmur3_32(bucket.as_bytes(), 0) as usize % sorted_clusters.len();
    Some(&sorted_clusters[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters(names: &[&str]) -> Vec<String> {
        let mut list: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        list.sort();
        list
    }

    #[test]
    fn empty_ensemble_has_no_owner() {
        assert_eq!(cluster_for(&[], "b"), None);
    }

    #[test]
    fn single_cluster_owns_all_buckets() {
        let list = clusters(&["main"]);
        assert_eq!(cluster_for(&list, "anything"), Some("main"));
    }

    #[test]
    fn assignment_is_stable() {
        let list = clusters(&["alpha", "beta", "gamma"]);
        let owner = cluster_for(&list, "users");
        for _ in 0..10 {
            assert_eq!(cluster_for(&list, "users"), owner);
        }
    }

    #[test]
    fn buckets_spread_over_clusters() {
        let list = clusters(&["alpha", "beta", "gamma"]);
        let mut owners = std::collections::HashSet::new();
        for i in 0..200 {
            owners.insert(cluster_for(&list, &format!("bucket:{i}")).unwrap());
        }
        assert_eq!(owners.len(), 3);
    }
}
