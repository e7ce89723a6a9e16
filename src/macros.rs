/// Build a [`RoleConstraint`](crate::RoleConstraint) from auth-constraint role names.
///
/// `roles![]` is an empty auth-constraint and therefore precludes access.
#[macro_export]
macro_rules! roles {
    () => {
        $crate::RoleConstraint::Precluded
    };
    ( $( $name:expr ),+ $(,)? ) => {
        $crate::RoleConstraint::from_role_names([ $( $name ),+ ])
    };
}
