use crate::api::access_grant::{AccessCheck, AccessGrantReq};
use crate::api::attendance::UpdateAttendance;
use crate::api::dashboard::{DashboardOverview, DashboardTotals, RankedWorker, WorkerHours};
use crate::api::health::{DatabaseHealth, HealthReport};
use crate::api::role::RoleView;
use crate::api::rotation::CreateRotation;
use crate::api::scheduled_date::{CreateScheduledDate, CreateScheduledDates, UpdateScheduledDate};
use crate::api::sub_warehouse::SubWarehouseReq;
use crate::api::user::{CreateUser, EmailAvailability, UpdateUser};
use crate::api::warehouse::{WarehouseRef, WarehouseReq};
use crate::api::worker::{CreateWorker, SetWorkerActive, WorkerListRow};
use crate::attendance::scheduler::{BatchOutcome, DateError, ScheduledDateOutcome};
use crate::attendance::service::{BulkCreateResult, CreateOutcome, RowError, WorkerSummary};
use crate::attendance::summary::HoursSummary;
use crate::export::SelectedDatesRequest;
use crate::model::access_grant::{AccessGrant, AccessGrantDetail};
use crate::model::attendance::{
    AttendanceDraft, AttendanceListRow, AttendanceRecord, NewAttendance, WorkerAttendanceRow,
};
use crate::model::role::Role;
use crate::model::rotation::WorkerRotation;
use crate::model::scheduled_date::ScheduledDate;
use crate::model::user::User;
use crate::model::warehouse::{SubWarehouse, SubWarehouseInfo, Warehouse};
use crate::model::worker::{Worker, WorkerRef};
use crate::models::{LoginReqDto, TokenPair};
use crate::notifications::{AttendanceEvent, ChangeKind};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Warehouse Attendance API",
        version = "1.0.0",
        description = r#"
## Warehouse attendance back office

Tracks the attendance of warehouse workers across warehouses and their
sub-warehouses.

### Key features
- **Scheduling**: opening a date for a sub-warehouse pre-creates one
  placeholder attendance row per assigned or rotated worker
- **Attendance**: entry/exit times with notes, idempotent per worker and date
- **Hours accounting**: worked, extra and missing hours per worker
- **Exports**: Excel workbooks per worker or per selected dates
- **Live updates**: server-sent events on every attendance change

### Security
Endpoints under `/api` require a **JWT Bearer** access token. Coordinators
only see the sub-warehouses they were granted; admins see everything.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::validate,
        crate::auth::handlers::force_disconnect,

        crate::api::user::create_user,
        crate::api::user::list_users,
        crate::api::user::get_user,
        crate::api::user::update_user,
        crate::api::user::delete_user,
        crate::api::user::email_available,

        crate::api::role::list_roles,

        crate::api::warehouse::create_warehouse,
        crate::api::warehouse::list_warehouses,
        crate::api::warehouse::list_assigned_warehouses,
        crate::api::warehouse::get_warehouse,
        crate::api::warehouse::update_warehouse,
        crate::api::warehouse::delete_warehouse,

        crate::api::sub_warehouse::create_sub_warehouse,
        crate::api::sub_warehouse::list_sub_warehouses,
        crate::api::sub_warehouse::list_assigned_sub_warehouses,
        crate::api::sub_warehouse::get_sub_warehouse,
        crate::api::sub_warehouse::sub_warehouse_info,
        crate::api::sub_warehouse::update_sub_warehouse,
        crate::api::sub_warehouse::delete_sub_warehouse,

        crate::api::worker::create_worker,
        crate::api::worker::list_workers,
        crate::api::worker::get_worker,
        crate::api::worker::update_worker,
        crate::api::worker::set_worker_active,
        crate::api::worker::delete_worker,
        crate::api::worker::workers_by_date,
        crate::api::worker::worker_attendance,

        crate::api::rotation::create_rotation,
        crate::api::rotation::list_rotations,
        crate::api::rotation::delete_rotation,

        crate::api::access_grant::create_grant,
        crate::api::access_grant::list_grants,
        crate::api::access_grant::my_grants,
        crate::api::access_grant::verify_access,
        crate::api::access_grant::get_grant,
        crate::api::access_grant::update_grant,
        crate::api::access_grant::delete_grant,
        crate::api::access_grant::delete_user_grants,

        crate::api::scheduled_date::create_scheduled_date,
        crate::api::scheduled_date::create_scheduled_dates,
        crate::api::scheduled_date::list_scheduled_dates,
        crate::api::scheduled_date::get_scheduled_date,
        crate::api::scheduled_date::update_scheduled_date,
        crate::api::scheduled_date::delete_scheduled_date,

        crate::api::attendance::list_attendance,
        crate::api::attendance::get_attendance,
        crate::api::attendance::create_attendance,
        crate::api::attendance::update_attendance,
        crate::api::attendance::delete_attendance,

        crate::api::dashboard::dashboard_overview,
        crate::api::dashboard::dashboard_totals,
        crate::api::dashboard::dashboard_week_workers,
        crate::api::dashboard::dashboard_overtime,
        crate::api::dashboard::dashboard_shortfall,

        crate::api::export::export_worker_range,
        crate::api::export::export_selected_dates,

        crate::api::notifications::attendance_events,

        crate::api::health::health,
        crate::api::health::liveness,
        crate::api::health::readiness
    ),
    components(
        schemas(
            LoginReqDto,
            TokenPair,
            User,
            CreateUser,
            UpdateUser,
            EmailAvailability,
            Role,
            RoleView,
            Warehouse,
            WarehouseReq,
            WarehouseRef,
            SubWarehouse,
            SubWarehouseReq,
            SubWarehouseInfo,
            Worker,
            WorkerRef,
            CreateWorker,
            SetWorkerActive,
            WorkerListRow,
            WorkerRotation,
            CreateRotation,
            AccessGrant,
            AccessGrantDetail,
            AccessGrantReq,
            AccessCheck,
            ScheduledDate,
            CreateScheduledDate,
            CreateScheduledDates,
            UpdateScheduledDate,
            ScheduledDateOutcome,
            BatchOutcome,
            DateError,
            AttendanceRecord,
            AttendanceDraft,
            NewAttendance,
            UpdateAttendance,
            AttendanceListRow,
            WorkerAttendanceRow,
            CreateOutcome,
            BulkCreateResult,
            RowError,
            WorkerSummary,
            HoursSummary,
            DashboardTotals,
            WorkerHours,
            RankedWorker,
            DashboardOverview,
            SelectedDatesRequest,
            AttendanceEvent,
            ChangeKind,
            HealthReport,
            DatabaseHealth
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token refresh and sessions"),
        (name = "Users", description = "Back-office user management"),
        (name = "Roles", description = "Fixed roles"),
        (name = "Warehouses", description = "Warehouse management"),
        (name = "Sub-warehouses", description = "Sub-warehouse management"),
        (name = "Workers", description = "Worker management"),
        (name = "Rotations", description = "Single-day worker rotations"),
        (name = "Access grants", description = "Coordinator access to sub-warehouses"),
        (name = "Scheduled dates", description = "Working dates and bulk scheduling"),
        (name = "Attendance", description = "Attendance records"),
        (name = "Dashboard", description = "Aggregated figures"),
        (name = "Export", description = "Excel exports"),
        (name = "Notifications", description = "Server-sent attendance events"),
        (name = "Health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_group_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/api/scheduled-dates/batch",
            "/api/attendance/{id}",
            "/api/export/scheduled-dates",
            "/health/ready",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
