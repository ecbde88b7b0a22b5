fn main() {
    kinolay::start_kinolay();
}
