use super::*;

#[test]
fn normalizes_to_unit_length() {
    let mut vector = vec![3.0, 4.0];
    l2_normalize(&mut vector);
    assert!((vector[0] - 0.6).abs() < 1e-6);
    assert!((vector[1] - 0.8).abs() < 1e-6);
    assert!((l2_norm(&vector) - 1.0).abs() < 1e-6);
}

#[test]
fn zero_vector_is_left_alone() {
    let mut vector = vec![0.0; 4];
    l2_normalize(&mut vector);
    assert_eq!(vector, vec![0.0; 4]);
}

#[test]
fn already_normalized_is_stable() {
    let mut vector = vec![0.0, 1.0, 0.0];
    l2_normalize(&mut vector);
    assert_eq!(vector, vec![0.0, 1.0, 0.0]);
}
