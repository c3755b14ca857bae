fn main() {
    locomotion_dataset::cli::run();
}
