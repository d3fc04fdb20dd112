fn main() {
    // Regenerate fixture tests when resources change
    build_deps::rerun_if_changed_paths("res/**/*").unwrap();
    build_deps::rerun_if_changed_paths("res/*").unwrap();
}
