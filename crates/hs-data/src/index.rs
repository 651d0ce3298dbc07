/// Positions in `search_list` of each item of `items` that it contains.
///
/// Each position is the first occurrence; missing items are skipped and
/// the output follows the order of `items`.
pub fn find_indexes<T: PartialEq>(items: &[T], search_list: &[T]) -> Vec<usize> {
    items
        .iter()
        .filter_map(|item| search_list.iter().position(|candidate| candidate == item))
        .collect()
}
