/// One method per HTTP verb, each forwarding to `self.request(Method::X, path)`.
///
/// Expanded inside the inherent impls of `Tester` and `Agent`: a type defining a method with
/// the same name as a verb fails to compile instead of silently losing it.
macro_rules! http_verbs {
    () => {
        http_verbs! {
            get => GET,
            post => POST,
            put => PUT,
            patch => PATCH,
            delete => DELETE,
            head => HEAD,
            options => OPTIONS,
        }
    };
    ($($verb:ident => $method:ident),+ $(,)?) => {
        $(
            #[doc = concat!("Start a `", stringify!($method), "` request to `path`.")]
            pub fn $verb(&self, path: &str) -> $crate::Test {
                self.request(::http::Method::$method, path)
            }
        )+
    };
}
