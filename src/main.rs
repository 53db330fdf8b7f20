fn main() {
    jms_transfer_lib::run()
}
