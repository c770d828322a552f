pub fn round_size_up_to_alignment_usize(
    size: usize,
    required_alignment: usize,
) -> usize {
    assert!(required_alignment > 0);
    ((size + required_alignment - 1) / required_alignment) * required_alignment
}
