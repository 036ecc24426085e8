fn main() {
    sso_broker::run_cli();
}
