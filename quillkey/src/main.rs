fn main() {
    quillkey::run()
}
