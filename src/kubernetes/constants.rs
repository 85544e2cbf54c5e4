pub const APP_KUBERNETES_IO_COMPONENT_KEY: &str = "app.kubernetes.io/component";

pub const APP_KUBERNETES_IO_INSTANCE_KEY: &str = "app.kubernetes.io/instance";

pub const APP_KUBERNETES_IO_MANAGED_BY_KEY: &str = "app.kubernetes.io/managed-by";
pub const APP_KUBERNETES_IO_MANAGED_BY_VALUE: &str = "pki-operator";

pub const APP_KUBERNETES_IO_NAME_KEY: &str = "app.kubernetes.io/name";
pub const APP_KUBERNETES_IO_NAME_VALUE: &str = "pki";

pub const BOX_COM: &str = "box.com";

pub const BOX_COM_OWNED_BY_KEY: &str = "box.com/owned-by";
