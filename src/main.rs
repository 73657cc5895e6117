fn main() {
    formdrop::run();
}
